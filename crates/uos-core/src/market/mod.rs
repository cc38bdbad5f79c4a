//! DEX market data: upstream client, trust heuristics, chart synthesis.

pub mod client;
pub mod history;
pub mod trust;

pub use client::{DexClient, MarketError, PairInfo, TokenPairs};
pub use history::{HistoryPeriod, PricePoint, day_close_prices, synthesize_series};
pub use trust::{TrustAnalysis, analyze_pair, degraded_analysis};
