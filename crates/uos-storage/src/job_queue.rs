//! Durable job storage - three-table queue design backed by redb.
//!
//! Uses separate tables for pending/processing/results so the head pop stays O(1).
//! Pending uses composite key "{priority:020}:{job_id}" for uniqueness and correct ordering.

use anyhow::{Result, anyhow};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::store::JobStore;

const PENDING: TableDefinition<&str, &[u8]> = TableDefinition::new("pending");
const PROCESSING: TableDefinition<&str, &[u8]> = TableDefinition::new("processing");
const RESULTS: TableDefinition<&str, &[u8]> = TableDefinition::new("results");

/// Durable queue and result store - only handles data persistence
#[derive(Clone)]
pub struct RedbJobStore {
    db: Arc<Database>,
    notify: Arc<Notify>,
    /// Counter tracking pending jobs, used for reliable notification
    pending_count: Arc<AtomicUsize>,
}

impl RedbJobStore {
    /// Open (or create) the database file and its tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Arc::new(Database::create(path)?);
        Self::new(db)
    }

    /// Create a store over an existing database handle.
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(PENDING)?;
        write_txn.open_table(PROCESSING)?;
        write_txn.open_table(RESULTS)?;
        write_txn.commit()?;

        // Count jobs that survived a restart so waiters wake up for them
        let pending_count = {
            let read_txn = db.begin_read()?;
            let pending = read_txn.open_table(PENDING)?;
            pending.len()? as usize
        };

        Ok(Self {
            db,
            notify: Arc::new(Notify::new()),
            pending_count: Arc::new(AtomicUsize::new(pending_count)),
        })
    }

    fn read_all(&self, table: TableDefinition<&str, &[u8]>) -> Result<Vec<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let mut jobs = Vec::new();

        for entry in table.iter()? {
            let (_, value) = entry?;
            jobs.push(value.value().to_vec());
        }

        Ok(jobs)
    }
}

#[async_trait::async_trait]
impl JobStore for RedbJobStore {
    fn enqueue(&self, priority: u64, job_id: &str, data: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PENDING)?;
            // Composite key: "{priority:020}:{job_id}" ensures uniqueness and correct ordering
            let key = format!("{:020}:{}", priority, job_id);
            table.insert(key.as_str(), data)?;
        }
        write_txn.commit()?;
        self.pending_count.fetch_add(1, Ordering::SeqCst);
        // Use notify_waiters() to ensure notification is not lost
        self.notify.notify_waiters();
        Ok(())
    }

    fn pop_pending(&self, update: &dyn Fn(&[u8]) -> Result<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        let write_txn = self.db.begin_write()?;

        let result = {
            let mut pending = write_txn.open_table(PENDING)?;

            // Extract first entry into owned values
            let first_entry = if let Some(first) = pending.first()? {
                let key_str = first.0.value().to_string();
                let data = first.1.value().to_vec();
                let job_id = key_str
                    .split(':')
                    .nth(1)
                    .ok_or_else(|| anyhow!("Invalid composite key format: {}", key_str))?
                    .to_string();
                Some((key_str, job_id, data))
            } else {
                None
            };

            if let Some((key, job_id, data)) = first_entry {
                pending.remove(key.as_str())?;

                // Update data via callback; on failure the pop is rolled back
                let updated_data = match update(&data) {
                    Ok(data) => data,
                    Err(e) => {
                        drop(pending);
                        write_txn.abort()?;
                        return Err(e);
                    }
                };

                let mut processing = write_txn.open_table(PROCESSING)?;
                processing.insert(job_id.as_str(), updated_data.as_slice())?;

                Some(updated_data)
            } else {
                None
            }
        };

        if result.is_some() {
            write_txn.commit()?;
            self.pending_count.fetch_sub(1, Ordering::SeqCst);
        } else {
            write_txn.abort()?;
        }

        Ok(result)
    }

    fn get_processing(&self, job_id: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let processing = read_txn.open_table(PROCESSING)?;

        if let Some(data) = processing.get(job_id)? {
            Ok(Some(data.value().to_vec()))
        } else {
            Ok(None)
        }
    }

    fn all_processing(&self) -> Result<Vec<Vec<u8>>> {
        self.read_all(PROCESSING)
    }

    fn remove_processing(&self, job_id: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut processing = write_txn.open_table(PROCESSING)?;
            processing.remove(job_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn move_to_results(&self, job_id: &str, data: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;

        {
            let mut processing = write_txn.open_table(PROCESSING)?;
            processing.remove(job_id)?;
        }

        {
            let mut results = write_txn.open_table(RESULTS)?;
            results.insert(job_id, data)?;
        }

        write_txn.commit()?;
        Ok(())
    }

    fn get_result(&self, job_id: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let results = read_txn.open_table(RESULTS)?;

        if let Some(data) = results.get(job_id)? {
            Ok(Some(data.value().to_vec()))
        } else {
            Ok(None)
        }
    }

    fn all_results(&self) -> Result<Vec<Vec<u8>>> {
        self.read_all(RESULTS)
    }

    fn remove_result(&self, job_id: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut results = write_txn.open_table(RESULTS)?;
            results.remove(job_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_any(&self, job_id: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;

        // Check processing
        let processing = read_txn.open_table(PROCESSING)?;
        if let Some(data) = processing.get(job_id)? {
            return Ok(Some(data.value().to_vec()));
        }

        // Check results
        let results = read_txn.open_table(RESULTS)?;
        if let Some(data) = results.get(job_id)? {
            return Ok(Some(data.value().to_vec()));
        }

        // Check pending (requires iteration)
        let pending = read_txn.open_table(PENDING)?;
        for entry in pending.iter()? {
            let (key, value) = entry?;
            let key_str = key.value();
            if let Some(id) = key_str.split(':').nth(1)
                && id == job_id
            {
                return Ok(Some(value.value().to_vec()));
            }
        }

        Ok(None)
    }

    fn has_pending(&self) -> bool {
        self.pending_count.load(Ordering::SeqCst) > 0
    }

    /// Wait for a pending job to be available.
    ///
    /// Checks the pending count first before waiting to avoid missing
    /// notifications that occurred before the wait started.
    async fn wait_for_job(&self) {
        if self.pending_count.load(Ordering::SeqCst) > 0 {
            return;
        }
        self.notify.notified().await;
    }
}
