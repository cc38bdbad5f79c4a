//! Thin client for the DexScreener REST API.

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::http_client::build_http_client;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("DEX API returned status {status}")]
    Api { status: u16 },

    #[error("No trading data found for this token/pair")]
    NoData,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, MarketError>;

#[derive(Clone)]
pub struct DexClient {
    client: Client,
    base_url: String,
}

impl DexClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_http_client(),
            base_url: base_url.into(),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketError::Api {
                status: status.as_u16(),
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// All pairs trading the given token.
    pub async fn token_pairs(&self, token_address: &str) -> Result<TokenPairs> {
        self.fetch(&format!("/dex/tokens/{}", token_address)).await
    }

    /// A single pair looked up by chain and pair address.
    pub async fn pair(&self, network: &str, pair_address: &str) -> Result<TokenPairs> {
        self.fetch(&format!("/dex/pairs/{}/{}", network, pair_address))
            .await
    }

    /// Unparsed token lookup for passthrough proxying.
    pub async fn token_pairs_raw(&self, token_address: &str) -> Result<serde_json::Value> {
        self.fetch(&format!("/dex/tokens/{}", token_address)).await
    }

    /// Unparsed pair lookup for passthrough proxying.
    pub async fn pair_raw(&self, network: &str, pair_address: &str) -> Result<serde_json::Value> {
        self.fetch(&format!("/dex/pairs/{}/{}", network, pair_address))
            .await
    }
}

/// Response envelope of the token and pair lookups. DexScreener sends
/// `pairs: null` for unknown tokens, so every field is optional here and
/// zero-valued below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenPairs {
    pub pairs: Option<Vec<PairInfo>>,
}

impl TokenPairs {
    pub fn first_pair(&self) -> Option<&PairInfo> {
        self.pairs.as_deref().and_then(|pairs| pairs.first())
    }

    /// First pair on the given chain, falling back to the overall first
    /// when no chain filter is given or nothing matches it.
    pub fn first_pair_on(&self, network: Option<&str>) -> Option<&PairInfo> {
        let pairs = self.pairs.as_deref()?;
        if let Some(network) = network
            && let Some(pair) = pairs.iter().find(|p| p.chain_id == network)
        {
            return Some(pair);
        }
        pairs.first()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PairInfo {
    pub chain_id: String,
    pub dex_id: String,
    pub pair_address: String,
    pub base_token: BaseToken,
    pub price_usd: String,
    pub price_change: PriceChange,
    pub volume: VolumeInfo,
    pub liquidity: LiquidityInfo,
    pub market_cap: f64,
    pub holders: u64,
}

impl PairInfo {
    /// Spot price as a number; the API sends it as a string.
    pub fn price(&self) -> f64 {
        self.price_usd.parse().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BaseToken {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub total_supply: Option<f64>,
    pub creator: Option<String>,
    pub mint_authority: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PriceChange {
    pub h24: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VolumeInfo {
    pub h24: f64,
    pub h24_change_percent: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LiquidityInfo {
    pub usd: f64,
    pub locked: bool,
    pub h24_change_percent: f64,
}
