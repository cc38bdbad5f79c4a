//! Token trust heuristics derived from a pair's market stats.
//!
//! All scores are coarse display strings. Thin liquidity, weak volume and
//! violent 24h swings each knock points off a 100% baseline, an unlocked
//! LP knocks off a few more. When the DEX lookup fails outright we still
//! answer with a degraded all-N/A payload instead of an error.

use chrono::Local;
use serde::Serialize;

use crate::market::client::PairInfo;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrustAnalysis {
    pub trust_score: String,
    pub rug_pull_risk: String,
    pub volume_analysis: String,
    pub holder_distribution: String,
    pub growth_pattern: String,
    pub liquidity_health: LiquidityHealth,
    pub market_impact: String,
    pub market_cap_trend: String,
    pub last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_info: Option<TokenInfo>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityHealth {
    pub value: String,
    pub change: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub mint: String,
    pub supply: String,
    pub creator: String,
    pub market_cap: String,
    pub mint_authority: String,
    pub lp_locked: String,
}

pub fn analyze_pair(pair: &PairInfo, token_address: &str) -> TrustAnalysis {
    let mint = if pair.base_token.address.is_empty() {
        token_address.to_string()
    } else {
        pair.base_token.address.clone()
    };

    TrustAnalysis {
        trust_score: risk_score(pair),
        rug_pull_risk: risk_level(pair).to_string(),
        volume_analysis: format_usd(pair.volume.h24),
        holder_distribution: format!("{} holders", pair.holders),
        growth_pattern: growth_pattern(pair).to_string(),
        liquidity_health: LiquidityHealth {
            value: format_usd(pair.liquidity.usd),
            change: format!("{}%", pair.liquidity.h24_change_percent),
        },
        market_impact: format!("{}%", pair.price_change.h24),
        market_cap_trend: format_usd(pair.market_cap),
        last_updated: local_timestamp(),
        token_info: Some(TokenInfo {
            mint,
            supply: format_supply(pair.base_token.total_supply),
            creator: pair
                .base_token
                .creator
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            market_cap: format_usd(pair.market_cap),
            mint_authority: pair
                .base_token
                .mint_authority
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            lp_locked: if pair.liquidity.locked {
                "100.00%"
            } else {
                "0.00%"
            }
            .to_string(),
        }),
    }
}

/// Placeholder analysis for when the DEX lookup fails. Served with a
/// success status so dashboards keep rendering.
pub fn degraded_analysis() -> TrustAnalysis {
    TrustAnalysis {
        trust_score: "N/A%".to_string(),
        rug_pull_risk: "Unknown".to_string(),
        volume_analysis: "N/A".to_string(),
        holder_distribution: "N/A".to_string(),
        growth_pattern: "Unknown".to_string(),
        liquidity_health: LiquidityHealth {
            value: "N/A".to_string(),
            change: "N/A".to_string(),
        },
        market_impact: "N/A".to_string(),
        market_cap_trend: "N/A".to_string(),
        last_updated: local_timestamp(),
        token_info: None,
    }
}

pub fn risk_score(pair: &PairInfo) -> String {
    let mut score: i32 = 100;

    if pair.liquidity.usd < 10_000.0 {
        score -= 30;
    }
    if pair.volume.h24 < 1_000.0 {
        score -= 20;
    }
    if pair.price_change.h24.abs() > 30.0 {
        score -= 20;
    }
    if !pair.liquidity.locked {
        score -= 15;
    }

    format!("{}%", score.max(0))
}

pub fn risk_level(pair: &PairInfo) -> &'static str {
    let liquidity = pair.liquidity.usd;
    let price_change = pair.price_change.h24.abs();
    let volume = pair.volume.h24;

    if liquidity < 10_000.0 || price_change > 50.0 || volume < 1_000.0 {
        "HIGH RISK"
    } else if liquidity < 50_000.0 || price_change > 20.0 || volume < 5_000.0 {
        "Medium Risk"
    } else {
        "Low Risk"
    }
}

pub fn growth_pattern(pair: &PairInfo) -> &'static str {
    let volume_change = pair.volume.h24_change_percent;
    let price_change = pair.price_change.h24;

    if volume_change > 20.0 && price_change > 0.0 {
        "Rapid Growth"
    } else if volume_change > 0.0 && price_change > 0.0 {
        "Steady Growth"
    } else if volume_change < 0.0 || price_change < 0.0 {
        "Declining"
    } else {
        "Volatile"
    }
}

/// Whole-dollar USD display, e.g. `$1,234,568` or `-$4,500`.
pub fn format_usd(value: f64) -> String {
    let grouped = group_thousands(&format!("{:.0}", value.abs()));
    if value < 0.0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

/// Compact supply display: `1B`, `250M`, `75K`, or the raw number.
pub fn format_supply(supply: Option<f64>) -> String {
    let Some(supply) = supply.filter(|s| *s > 0.0) else {
        return "Unknown".to_string();
    };

    if supply >= 1e9 {
        format!("{:.0}B", supply / 1e9)
    } else if supply >= 1e6 {
        format!("{:.0}M", supply / 1e6)
    } else if supply >= 1e3 {
        format!("{:.0}K", supply / 1e3)
    } else {
        supply.to_string()
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn local_timestamp() -> String {
    Local::now().format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}
