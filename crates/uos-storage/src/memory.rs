//! In-memory job store used by tests and ephemeral deployments.
//!
//! Mirrors the redb layout: a sorted pending map keyed by
//! "{priority:020}:{job_id}" plus flat processing/results maps.

use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::store::JobStore;

#[derive(Default)]
struct MemoryTables {
    pending: BTreeMap<String, Vec<u8>>,
    processing: HashMap<String, Vec<u8>>,
    results: HashMap<String, Vec<u8>>,
}

/// Non-durable store with the same semantics as the redb backend.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    tables: Arc<Mutex<MemoryTables>>,
    notify: Arc<Notify>,
    pending_count: Arc<AtomicUsize>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryJobStore {
    fn enqueue(&self, priority: u64, job_id: &str, data: &[u8]) -> Result<()> {
        let key = format!("{:020}:{}", priority, job_id);
        self.tables.lock().pending.insert(key, data.to_vec());
        self.pending_count.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
        Ok(())
    }

    fn pop_pending(&self, update: &dyn Fn(&[u8]) -> Result<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        let mut tables = self.tables.lock();

        let Some(key) = tables.pending.keys().next().cloned() else {
            return Ok(None);
        };
        let job_id = key
            .split(':')
            .nth(1)
            .ok_or_else(|| anyhow!("Invalid composite key format: {}", key))?
            .to_string();

        // Holding the lock through the update keeps the pop atomic
        let Some(data) = tables.pending.remove(&key) else {
            return Ok(None);
        };
        let updated_data = match update(&data) {
            Ok(data) => data,
            Err(e) => {
                tables.pending.insert(key, data);
                return Err(e);
            }
        };

        tables.processing.insert(job_id, updated_data.clone());
        self.pending_count.fetch_sub(1, Ordering::SeqCst);

        Ok(Some(updated_data))
    }

    fn get_processing(&self, job_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.lock().processing.get(job_id).cloned())
    }

    fn all_processing(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.tables.lock().processing.values().cloned().collect())
    }

    fn remove_processing(&self, job_id: &str) -> Result<()> {
        self.tables.lock().processing.remove(job_id);
        Ok(())
    }

    fn move_to_results(&self, job_id: &str, data: &[u8]) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.processing.remove(job_id);
        tables.results.insert(job_id.to_string(), data.to_vec());
        Ok(())
    }

    fn get_result(&self, job_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.lock().results.get(job_id).cloned())
    }

    fn all_results(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.tables.lock().results.values().cloned().collect())
    }

    fn remove_result(&self, job_id: &str) -> Result<()> {
        self.tables.lock().results.remove(job_id);
        Ok(())
    }

    fn get_any(&self, job_id: &str) -> Result<Option<Vec<u8>>> {
        let tables = self.tables.lock();

        if let Some(data) = tables.processing.get(job_id) {
            return Ok(Some(data.clone()));
        }
        if let Some(data) = tables.results.get(job_id) {
            return Ok(Some(data.clone()));
        }
        for (key, data) in &tables.pending {
            if let Some(id) = key.split(':').nth(1)
                && id == job_id
            {
                return Ok(Some(data.clone()));
            }
        }

        Ok(None)
    }

    fn has_pending(&self) -> bool {
        self.pending_count.load(Ordering::SeqCst) > 0
    }

    async fn wait_for_job(&self) {
        if self.pending_count.load(Ordering::SeqCst) > 0 {
            return;
        }
        self.notify.notified().await;
    }
}
