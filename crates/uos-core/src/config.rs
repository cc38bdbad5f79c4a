//! Application configuration.
//!
//! Loaded from a TOML file when one is present (`UOS_CONFIG` or `uos.toml`),
//! otherwise from environment variables. Assistant credentials are always
//! topped up from the environment and missing credentials are a hard startup
//! error; there is no mock fallback.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

pub use uos_storage::StoreBackend;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub assistant: AssistantSection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub market: MarketSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_db_path")]
    pub path: String,
    /// How long terminal results stay queryable.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
    /// How long a job may sit in processing before it is considered stalled.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
            result_ttl_secs: default_result_ttl_secs(),
            lease_secs: default_lease_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSection {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub assistant_id: String,
    #[serde(default = "default_assistant_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            assistant_id: String::new(),
            base_url: default_assistant_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Pause between finished jobs, keeping assistant traffic paced.
    #[serde(default = "default_worker_delay_ms")]
    pub delay_ms: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            delay_ms: default_worker_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_rate_limit")]
    pub max_requests: u64,
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_requests: default_rate_limit(),
            window_secs: default_rate_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketSection {
    #[serde(default = "default_market_base_url")]
    pub base_url: String,
    #[serde(default = "default_network")]
    pub network: String,
    /// Flagship token shown when a request names no token.
    #[serde(default = "default_token_address")]
    pub token_address: String,
    #[serde(default = "default_pair_address")]
    pub pair_address: String,
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            base_url: default_market_base_url(),
            network: default_network(),
            token_address: default_token_address(),
            pair_address: default_pair_address(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "uos.db".to_string()
}

fn default_result_ttl_secs() -> u64 {
    600
}

fn default_lease_secs() -> u64 {
    60
}

fn default_assistant_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_attempts() -> u32 {
    45
}

fn default_num_workers() -> usize {
    1
}

fn default_worker_delay_ms() -> u64 {
    1000
}

fn default_rate_limit() -> u64 {
    10
}

fn default_rate_window_secs() -> u64 {
    10
}

fn default_market_base_url() -> String {
    "https://api.dexscreener.com/latest".to_string()
}

fn default_network() -> String {
    "solana".to_string()
}

fn default_token_address() -> String {
    "79HZeHkX9A5WfBg72ankd1ppTXGepoSGpmkxW63wsrHY".to_string()
}

fn default_pair_address() -> String {
    default_token_address()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let mut config = if let Some(file_config) = load_from_file()? {
            file_config
        } else {
            Self::from_env()?
        };

        config.fill_credentials_from_env();
        config.validate()?;
        Ok(config)
    }

    fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(host) = env_string("UOS_SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_parse("UOS_SERVER_PORT") {
            config.server.port = port;
        }

        if let Some(backend) = env_string("UOS_STORAGE_BACKEND") {
            config.storage.backend = parse_backend(&backend)?;
        }
        if let Some(path) = env_string("UOS_DB_PATH") {
            config.storage.path = path;
        }
        if let Some(ttl) = env_parse("UOS_RESULT_TTL_SECS") {
            config.storage.result_ttl_secs = ttl;
        }
        if let Some(lease) = env_parse("UOS_LEASE_SECS") {
            config.storage.lease_secs = lease;
        }

        if let Some(base_url) = env_string("OPENAI_BASE_URL") {
            config.assistant.base_url = base_url;
        }
        if let Some(interval) = env_parse("UOS_POLL_INTERVAL_MS") {
            config.assistant.poll_interval_ms = interval;
        }
        if let Some(attempts) = env_parse("UOS_MAX_POLL_ATTEMPTS") {
            config.assistant.max_poll_attempts = attempts;
        }

        if let Some(workers) = env_parse("UOS_NUM_WORKERS") {
            config.worker.num_workers = workers;
        }
        if let Some(delay) = env_parse("UOS_WORKER_DELAY_MS") {
            config.worker.delay_ms = delay;
        }

        if let Some(limit) = env_parse("UOS_RATE_LIMIT") {
            config.rate_limit.max_requests = limit;
        }
        if let Some(window) = env_parse("UOS_RATE_WINDOW_SECS") {
            config.rate_limit.window_secs = window;
        }

        if let Some(base_url) = env_string("DEXSCREENER_BASE_URL") {
            config.market.base_url = base_url;
        }
        if let Some(network) = env_string("UOS_NETWORK") {
            config.market.network = network;
        }
        if let Some(token) = env_string("TOKEN_ADDRESS") {
            config.market.token_address = token;
        }
        if let Some(pair) = env_string("UOS_PAIR_ADDRESS") {
            config.market.pair_address = pair;
        }

        Ok(config)
    }

    /// Credentials are read from the environment even in file mode, so API
    /// keys never have to live in a checked-in TOML file.
    fn fill_credentials_from_env(&mut self) {
        if self.assistant.api_key.is_empty()
            && let Some(api_key) = env_string("OPENAI_API_KEY")
        {
            self.assistant.api_key = api_key;
        }
        if self.assistant.assistant_id.is_empty()
            && let Some(assistant_id) = env_string("OPENAI_ASSISTANT_ID")
        {
            self.assistant.assistant_id = assistant_id;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.assistant.api_key.is_empty() {
            anyhow::bail!("OPENAI_API_KEY is not set; refusing to start without assistant access");
        }
        if self.assistant.assistant_id.is_empty() {
            anyhow::bail!("OPENAI_ASSISTANT_ID is not set; refusing to start without an assistant");
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse::<T>().ok())
}

fn parse_backend(value: &str) -> anyhow::Result<StoreBackend> {
    match value.to_ascii_lowercase().as_str() {
        "redb" => Ok(StoreBackend::Redb),
        "memory" => Ok(StoreBackend::Memory),
        other => anyhow::bail!("Unknown storage backend '{}', expected 'redb' or 'memory'", other),
    }
}

fn load_from_file() -> anyhow::Result<Option<AppConfig>> {
    let config_path = env::var("UOS_CONFIG").ok();
    let path = if let Some(path) = config_path {
        Some(path)
    } else if Path::new("uos.toml").exists() {
        Some("uos.toml".to_string())
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(None);
    };

    let contents = fs::read_to_string(&path)
        .map_err(|err| anyhow::anyhow!("Failed to read config {}: {}", path, err))?;
    let parsed: AppConfig = toml::from_str(&contents)
        .map_err(|err| anyhow::anyhow!("Failed to parse config {}: {}", path, err))?;
    Ok(Some(parsed))
}
