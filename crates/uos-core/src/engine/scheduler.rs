//! Queue-facing job lifecycle: admit, pop, finish, recover, expire.
//!
//! The scheduler owns (de)serialization of `ChatJob` around the byte-level
//! `JobStore`, so handlers and workers never touch raw table data.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use uos_storage::JobStore;

use crate::models::{ChatJob, ChatReply, JobStatus};

/// Client-visible state of a request id.
#[derive(Debug, Clone, PartialEq)]
pub enum JobView {
    Queued,
    Processing,
    Completed(ChatReply),
    Failed(String),
    NotFound,
}

pub struct Scheduler {
    store: Arc<dyn JobStore>,
    result_ttl: Duration,
    lease: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, result_ttl: Duration, lease: Duration) -> Self {
        Self {
            store,
            result_ttl,
            lease,
        }
    }

    /// Admit a message to the queue and return its request id.
    pub fn submit_message(
        &self,
        message: String,
        conversation_token: Option<String>,
    ) -> Result<String> {
        let job = ChatJob::new(message, conversation_token);
        let job_id = job.id.clone();

        let priority = job.priority();
        let serialized = serde_json::to_vec(&job)?;
        self.store.enqueue(priority, &job_id, &serialized)?;

        Ok(job_id)
    }

    /// Pop the next job, or None when the queue stays empty past `idle_wait`.
    ///
    /// The wait is bounded so worker loops can re-check their running flag.
    pub async fn pop_job(&self, idle_wait: Duration) -> Result<Option<ChatJob>> {
        if let Some(job) = self.try_pop_job()? {
            return Ok(Some(job));
        }

        if tokio::time::timeout(idle_wait, self.store.wait_for_job())
            .await
            .is_err()
        {
            return Ok(None);
        }

        // Another worker may have won the race; the next loop pass retries
        self.try_pop_job()
    }

    /// Uses the store's atomic pop so the job is marked processing in the
    /// same operation that removes it from pending.
    fn try_pop_job(&self) -> Result<Option<ChatJob>> {
        let popped = self.store.pop_pending(&|data| {
            let mut job: ChatJob = serde_json::from_slice(data)?;
            job.start();
            Ok(serde_json::to_vec(&job)?)
        })?;

        match popped {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub fn complete_job(&self, job_id: &str, reply: ChatReply) -> Result<()> {
        self.finish_job(job_id, JobStatus::Completed, Some(reply), None)
    }

    pub fn fail_job(&self, job_id: &str, error: String) -> Result<()> {
        self.finish_job(job_id, JobStatus::Failed, None, Some(error))
    }

    fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        reply: Option<ChatReply>,
        error: Option<String>,
    ) -> Result<()> {
        if let Some(data) = self.store.get_processing(job_id)? {
            let mut job: ChatJob = serde_json::from_slice(&data)?;
            let retention_ms = self.result_ttl.as_millis() as i64;

            match status {
                JobStatus::Completed => {
                    if let Some(reply) = reply {
                        job.complete(reply, retention_ms);
                    }
                }
                JobStatus::Failed => {
                    if let Some(error) = error {
                        job.fail(error, retention_ms);
                    }
                }
                _ => {}
            }

            let serialized = serde_json::to_vec(&job)?;
            self.store.move_to_results(job_id, &serialized)?;
        }

        Ok(())
    }

    /// Resolve a request id to its client-visible state.
    ///
    /// Expired results read as `NotFound` even before the purge sweep
    /// removes them.
    pub fn job_status(&self, job_id: &str) -> Result<JobView> {
        let Some(data) = self.store.get_any(job_id)? else {
            return Ok(JobView::NotFound);
        };

        let job: ChatJob = serde_json::from_slice(&data)?;
        let now = chrono::Utc::now().timestamp_millis();

        let view = match job.status {
            JobStatus::Queued => JobView::Queued,
            JobStatus::Processing => JobView::Processing,
            JobStatus::Completed | JobStatus::Failed if job.is_expired(now) => JobView::NotFound,
            JobStatus::Completed => match job.response {
                Some(reply) => JobView::Completed(reply),
                None => JobView::Failed("Result payload missing".to_string()),
            },
            JobStatus::Failed => JobView::Failed(
                job.error
                    .unwrap_or_else(|| "Processing failed".to_string()),
            ),
        };

        Ok(view)
    }

    /// Re-enqueue jobs whose processing lease has lapsed.
    ///
    /// Covers worker crashes mid-job: the job runs again rather than being
    /// stuck in processing forever. A job that finished just before the
    /// crash may run twice; clients see one terminal result either way.
    pub fn recover_stalled_jobs(&self) -> Result<u32> {
        let mut recovered = 0;
        let now = chrono::Utc::now().timestamp_millis();
        let lease_ms = self.lease.as_millis() as i64;

        for data in self.store.all_processing()? {
            let mut job: ChatJob = serde_json::from_slice(&data)?;

            if let Some(started_at) = job.started_at
                && now - started_at > lease_ms
            {
                job.status = JobStatus::Queued;
                job.started_at = None;

                let job_id = job.id.clone();
                let priority = job.priority();
                let serialized = serde_json::to_vec(&job)?;

                self.store.remove_processing(&job_id)?;
                self.store.enqueue(priority, &job_id, &serialized)?;

                recovered += 1;
            }
        }

        Ok(recovered)
    }

    /// Delete terminal results past their retention deadline.
    pub fn purge_expired_results(&self) -> Result<u32> {
        let mut purged = 0;
        let now = chrono::Utc::now().timestamp_millis();

        for data in self.store.all_results()? {
            let job: ChatJob = serde_json::from_slice(&data)?;
            if job.is_expired(now) {
                self.store.remove_result(&job.id)?;
                purged += 1;
            }
        }

        Ok(purged)
    }
}
