pub mod assistant;
pub mod config;
pub mod engine;
pub mod market;
pub mod models;

mod http_client;

pub use models::*;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::assistant::{AssistantProvider, OpenAiAssistant};
use crate::config::AppConfig;
use crate::engine::{ChatExecutor, Scheduler};
use crate::market::DexClient;
use uos_storage::open_store;

/// Core application state shared by the HTTP layer and tests
pub struct AppCore {
    pub config: AppConfig,
    pub scheduler: Arc<Scheduler>,
    pub executor: Arc<ChatExecutor>,
    pub market: DexClient,
}

impl AppCore {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let provider = Arc::new(OpenAiAssistant::from_config(&config.assistant));
        Self::with_provider(config, provider)
    }

    /// Wire the core around a caller-supplied assistant. Tests use this to
    /// swap in a scripted provider instead of real API traffic.
    pub fn with_provider(
        config: AppConfig,
        provider: Arc<dyn AssistantProvider>,
    ) -> anyhow::Result<Self> {
        info!(backend = ?config.storage.backend, "Initializing Universal OS core");
        let store = open_store(config.storage.backend, &config.storage.path)?;

        let scheduler = Arc::new(Scheduler::new(
            store,
            Duration::from_secs(config.storage.result_ttl_secs),
            Duration::from_secs(config.storage.lease_secs),
        ));

        let executor = Arc::new(ChatExecutor::new(
            scheduler.clone(),
            provider,
            config.worker.num_workers,
            Duration::from_millis(config.worker.delay_ms),
        ));

        let market = DexClient::new(config.market.base_url.clone());

        Ok(Self {
            config,
            scheduler,
            executor,
            market,
        })
    }
}
