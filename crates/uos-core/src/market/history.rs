//! Synthetic price series for chart endpoints.
//!
//! Real candle history is not available from the free DEX API, so the chart
//! data is derived from what is: the current spot price and the reported
//! percentage changes. Each series drifts linearly from the implied start
//! price to the current one, with sine-weighted noise so the middle of the
//! window wiggles and the endpoints stay anchored.

use rand::RngExt;
use serde::Serialize;

const DAY_CLOSE_POINTS: usize = 288;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPeriod {
    H1,
    H24,
    D7,
}

impl HistoryPeriod {
    /// Unknown period strings fall back to the 24h window.
    pub fn parse(s: &str) -> Self {
        match s {
            "1h" => Self::H1,
            "7d" => Self::D7,
            _ => Self::H24,
        }
    }

    pub fn time_range_secs(self) -> i64 {
        match self {
            Self::H1 => 60 * 60,
            Self::H24 => 24 * 60 * 60,
            Self::D7 => 7 * 24 * 60 * 60,
        }
    }

    pub fn points(self) -> usize {
        match self {
            Self::H1 => 60,
            Self::H24 => 96,
            Self::D7 => 168,
        }
    }

    fn change_fraction(self, h1_pct: f64, h24_pct: f64, d7_pct: f64) -> f64 {
        let pct = match self {
            Self::H1 => h1_pct,
            Self::H24 => h24_pct,
            Self::D7 => d7_pct,
        };
        pct / 100.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PricePoint {
    pub time: i64,
    pub value: f64,
}

/// Timestamped series ending at `current_price` now, starting one period ago
/// at the price implied by the period's percentage change.
pub fn synthesize_series(
    period: HistoryPeriod,
    current_price: f64,
    h1_pct: f64,
    h24_pct: f64,
    d7_pct: f64,
) -> Vec<PricePoint> {
    let now = chrono::Utc::now().timestamp();
    let change = period.change_fraction(h1_pct, h24_pct, d7_pct);
    let points = period.points();
    let time_range = period.time_range_secs();
    let step = time_range / points as i64;

    let start_price = implied_start(current_price, change);
    let volatility = change.abs() * 0.1;
    let mut rng = rand::rng();

    let mut series = Vec::with_capacity(points + 1);
    for i in 0..=points {
        let time = now - time_range + i as i64 * step;
        let progress = i as f64 / points as f64;
        let base = start_price + (current_price - start_price) * progress;
        let noise =
            rng.random_range(-1.0..1.0) * volatility * (progress * std::f64::consts::PI).sin();
        series.push(PricePoint {
            time,
            value: round8(base * (1.0 + noise)),
        });
    }

    // Pin the newest point to the observed price
    if let Some(last) = series.last_mut() {
        *last = PricePoint {
            time: now,
            value: current_price,
        };
    }

    series.sort_by_key(|p| p.time);
    series
}

/// 24 hours of five-minute closes ending at `current_price`.
pub fn day_close_prices(current_price: f64, h24_pct: f64) -> Vec<f64> {
    let change = h24_pct / 100.0;
    let start_price = implied_start(current_price, change);
    let volatility = change.abs() * 0.1;
    let mut rng = rand::rng();

    let mut prices = Vec::with_capacity(DAY_CLOSE_POINTS);
    for i in 0..DAY_CLOSE_POINTS {
        let progress = i as f64 / (DAY_CLOSE_POINTS - 1) as f64;
        let base = start_price + (current_price - start_price) * progress;
        let noise =
            rng.random_range(-1.0..1.0) * volatility * (progress * std::f64::consts::PI).sin();
        prices.push(round8(base * (1.0 + noise)));
    }

    if let Some(last) = prices.last_mut() {
        *last = current_price;
    }
    prices
}

fn implied_start(current_price: f64, change: f64) -> f64 {
    // A -100% change would put the start at infinity
    if (1.0 + change).abs() < f64::EPSILON {
        current_price
    } else {
        current_price / (1.0 + change)
    }
}

fn round8(v: f64) -> f64 {
    (v * 1e8).round() / 1e8
}
