//! Storage contract for the chat job pipeline.
//!
//! One `JobStore` trait with two backings: redb for durable deployments and
//! an in-memory map for tests. The backing is chosen by configuration, never
//! by a runtime fallback.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::job_queue::RedbJobStore;
use crate::memory::MemoryJobStore;

/// Queue and result storage.
///
/// Jobs are opaque byte blobs at this layer; serialization lives with the
/// caller. The three tables (pending, processing, results) correspond to the
/// three client-visible states of a request.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Append a job to the pending queue. Lower priority pops first.
    fn enqueue(&self, priority: u64, job_id: &str, data: &[u8]) -> Result<()>;

    /// Atomically pop the head of the pending queue into processing.
    ///
    /// `update` transforms the stored bytes as part of the same operation; if
    /// it fails the pop is rolled back and the job stays pending.
    fn pop_pending(&self, update: &dyn Fn(&[u8]) -> Result<Vec<u8>>) -> Result<Option<Vec<u8>>>;

    fn get_processing(&self, job_id: &str) -> Result<Option<Vec<u8>>>;

    fn all_processing(&self) -> Result<Vec<Vec<u8>>>;

    fn remove_processing(&self, job_id: &str) -> Result<()>;

    /// Move a job from processing to results in one step.
    fn move_to_results(&self, job_id: &str, data: &[u8]) -> Result<()>;

    fn get_result(&self, job_id: &str) -> Result<Option<Vec<u8>>>;

    fn all_results(&self) -> Result<Vec<Vec<u8>>>;

    fn remove_result(&self, job_id: &str) -> Result<()>;

    /// Look a job up in any table: processing first, then results, then pending.
    fn get_any(&self, job_id: &str) -> Result<Option<Vec<u8>>>;

    fn has_pending(&self) -> bool;

    /// Wait until at least one pending job exists.
    async fn wait_for_job(&self);
}

/// Which backing store to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redb,
    Memory,
}

/// Open the configured backing store.
pub fn open_store(backend: StoreBackend, db_path: &str) -> Result<Arc<dyn JobStore>> {
    match backend {
        StoreBackend::Redb => {
            tracing::info!(path = db_path, "Opening redb job store");
            Ok(Arc::new(RedbJobStore::open(db_path)?))
        }
        StoreBackend::Memory => Ok(Arc::new(MemoryJobStore::new())),
    }
}
