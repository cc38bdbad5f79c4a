//! DEX market endpoints: trust analysis, pair proxying, chart history.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use uos_core::market::{
    self, HistoryPeriod, MarketError, PairInfo, PricePoint, TrustAnalysis,
};

use crate::api::error::ApiError;
use crate::api::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustQuery {
    #[serde(default)]
    pub token_address: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
}

/// Trust heuristics for a token. Upstream trouble degrades to an all-N/A
/// payload instead of an error so dashboards keep rendering.
pub async fn trust_analysis(
    State(state): State<AppState>,
    Query(query): Query<TrustQuery>,
) -> Result<Json<TrustAnalysis>, ApiError> {
    let token_address = query
        .token_address
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if token_address.is_empty() {
        return Err(ApiError::Validation(
            "Please provide a token address".to_string(),
        ));
    }

    let analysis = match state.core.market.token_pairs(token_address).await {
        Ok(pairs) => match pairs.first_pair_on(query.network.as_deref()) {
            Some(pair) => market::analyze_pair(pair, token_address),
            None => market::analyze_pair(&PairInfo::default(), token_address),
        },
        Err(err) => {
            tracing::error!(error = %err, token_address, "Trust lookup failed, serving degraded analysis");
            market::degraded_analysis()
        }
    };

    Ok(Json(analysis))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairsQuery {
    #[serde(default)]
    pub pair_address: Option<String>,
    #[serde(default)]
    pub token_address: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
}

/// Raw DexScreener passthrough. Looks the pair up directly first, falls
/// back to a token search, and reports no-data only when both come up dry.
pub async fn dexscreener_pairs(
    State(state): State<AppState>,
    Query(query): Query<PairsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let defaults = &state.core.config.market;
    let network = query.network.as_deref().unwrap_or(&defaults.network);
    let pair_address = query.pair_address.as_deref().unwrap_or(&defaults.pair_address);
    let token_address = query
        .token_address
        .as_deref()
        .unwrap_or(&defaults.token_address);

    let by_pair = state.core.market.pair_raw(network, pair_address).await?;
    if has_pairs(&by_pair) {
        return Ok(Json(by_pair));
    }

    let by_token = state.core.market.token_pairs_raw(token_address).await?;
    if has_pairs(&by_token) {
        return Ok(Json(by_token));
    }

    Err(ApiError::Upstream(MarketError::NoData))
}

fn has_pairs(payload: &serde_json::Value) -> bool {
    payload
        .get("pairs")
        .and_then(|pairs| pairs.as_array())
        .is_some_and(|pairs| !pairs.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryQuery {
    #[serde(default)]
    pub token_address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryResponse {
    pub prices: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_info: Option<PairSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairSummary {
    pub address: String,
    pub chain: String,
    pub dex: String,
}

/// A day of five-minute closes for the token's first pair. Lookup trouble
/// answers with an empty series, not an error.
pub async fn price_history(
    State(state): State<AppState>,
    Query(query): Query<PriceHistoryQuery>,
) -> Result<Json<PriceHistoryResponse>, ApiError> {
    let token_address = query
        .token_address
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if token_address.is_empty() {
        return Err(ApiError::Validation(
            "Please provide a token address".to_string(),
        ));
    }

    let empty = PriceHistoryResponse {
        prices: Vec::new(),
        pair_info: None,
    };

    let pairs = match state.core.market.token_pairs(token_address).await {
        Ok(pairs) => pairs,
        Err(err) => {
            tracing::error!(error = %err, token_address, "Price history lookup failed");
            return Ok(Json(empty));
        }
    };

    let Some(pair) = pairs.first_pair() else {
        return Ok(Json(empty));
    };

    let prices = market::day_close_prices(pair.price(), pair.price_change.h24);
    Ok(Json(PriceHistoryResponse {
        prices,
        pair_info: Some(PairSummary {
            address: pair.pair_address.clone(),
            chain: pair.chain_id.clone(),
            dex: pair.dex_id.clone(),
        }),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SyntheticHistoryQuery {
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub h1: Option<String>,
    #[serde(default)]
    pub h24: Option<String>,
    #[serde(default)]
    pub d7: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticHistoryResponse {
    pub price_history: Vec<PricePoint>,
}

/// Chart series derived from the caller-supplied spot price and change
/// percentages. Stateless, so the client can re-render any period cheaply.
pub async fn dexscreener_history(
    Query(query): Query<SyntheticHistoryQuery>,
) -> Result<Json<SyntheticHistoryResponse>, ApiError> {
    let period = HistoryPeriod::parse(query.period.as_deref().unwrap_or("24h"));
    let price = parse_metric(query.price.as_deref(), "price")?;
    let h1 = parse_metric(query.h1.as_deref(), "h1")?;
    let h24 = parse_metric(query.h24.as_deref(), "h24")?;
    let d7 = parse_metric(query.d7.as_deref(), "d7")?;

    let price_history = market::synthesize_series(period, price, h1, h24, d7);
    Ok(Json(SyntheticHistoryResponse { price_history }))
}

fn parse_metric(value: Option<&str>, name: &str) -> Result<f64, ApiError> {
    value
        .unwrap_or("0")
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid {} data", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uos_core::AppCore;
    use uos_core::config::{AppConfig, StoreBackend};

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.backend = StoreBackend::Memory;
        config.assistant.api_key = "sk-test".to_string();
        config.assistant.assistant_id = "asst_test".to_string();
        config
    }

    /// State whose market client points at a closed port, so every DEX
    /// lookup fails fast.
    fn unreachable_market_state() -> AppState {
        let mut config = test_config();
        config.market.base_url = "http://127.0.0.1:1".to_string();
        let core = Arc::new(AppCore::new(config).unwrap());
        AppState::new(core)
    }

    #[tokio::test]
    async fn test_trust_requires_token_address() {
        let err = trust_analysis(
            State(unreachable_market_state()),
            Query(TrustQuery {
                token_address: None,
                network: None,
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Please provide a token address");
    }

    #[tokio::test]
    async fn test_trust_degrades_on_upstream_failure() {
        let analysis = trust_analysis(
            State(unreachable_market_state()),
            Query(TrustQuery {
                token_address: Some("TOKENADDR".to_string()),
                network: None,
            }),
        )
        .await
        .unwrap()
        .0;

        assert_eq!(analysis.trust_score, "N/A%");
        assert_eq!(analysis.rug_pull_risk, "Unknown");
        assert!(analysis.token_info.is_none());
    }

    #[tokio::test]
    async fn test_price_history_empty_on_upstream_failure() {
        let response = price_history(
            State(unreachable_market_state()),
            Query(PriceHistoryQuery {
                token_address: Some("TOKENADDR".to_string()),
            }),
        )
        .await
        .unwrap()
        .0;

        assert!(response.prices.is_empty());
        assert!(response.pair_info.is_none());
    }

    #[tokio::test]
    async fn test_history_defaults_to_24h_window() {
        let response = dexscreener_history(Query(SyntheticHistoryQuery {
            period: None,
            price: None,
            h1: None,
            h24: None,
            d7: None,
        }))
        .await
        .unwrap()
        .0;

        assert_eq!(response.price_history.len(), 97);
    }

    #[tokio::test]
    async fn test_history_respects_period_and_change() {
        let response = dexscreener_history(Query(SyntheticHistoryQuery {
            period: Some("1h".to_string()),
            price: Some("100".to_string()),
            h1: Some("25".to_string()),
            h24: None,
            d7: None,
        }))
        .await
        .unwrap()
        .0;

        assert_eq!(response.price_history.len(), 61);
        assert_eq!(response.price_history.last().unwrap().value, 100.0);
        assert_eq!(response.price_history[0].value, 80.0);
    }

    #[tokio::test]
    async fn test_history_rejects_bad_price() {
        let err = dexscreener_history(Query(SyntheticHistoryQuery {
            period: None,
            price: Some("abc".to_string()),
            h1: None,
            h24: None,
            d7: None,
        }))
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Invalid price data");
    }

    #[test]
    fn test_has_pairs() {
        assert!(has_pairs(&serde_json::json!({ "pairs": [{ "chainId": "solana" }] })));
        assert!(!has_pairs(&serde_json::json!({ "pairs": [] })));
        assert!(!has_pairs(&serde_json::json!({ "pairs": null })));
        assert!(!has_pairs(&serde_json::json!({})));
    }
}
