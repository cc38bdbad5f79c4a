//! Supervised worker pool consuming the chat job queue.
//!
//! Idle passes double as queue maintenance: worker 0 re-queues stalled
//! jobs and every worker drops expired results.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::assistant::{AssistantError, AssistantProvider};
use crate::engine::scheduler::Scheduler;

const IDLE_WAIT_MS: u64 = 1000;

/// Owns the worker lifecycle: start is idempotent, stop flips a shared flag
/// that workers observe within one idle wait.
pub struct ChatExecutor {
    scheduler: Arc<Scheduler>,
    provider: Arc<dyn AssistantProvider>,
    num_workers: usize,
    job_delay: Duration,
    running: Arc<Mutex<bool>>,
}

impl ChatExecutor {
    pub fn new(
        scheduler: Arc<Scheduler>,
        provider: Arc<dyn AssistantProvider>,
        num_workers: usize,
        job_delay: Duration,
    ) -> Self {
        Self {
            scheduler,
            provider,
            num_workers,
            job_delay,
            running: Arc::new(Mutex::new(false)),
        }
    }

    pub async fn start(&self) {
        if !self.try_start().await {
            return;
        }

        self.recover_stalled_jobs();
        self.spawn_workers(self.num_workers).await;
    }

    /// Ask workers to finish their current job and exit.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    async fn try_start(&self) -> bool {
        let mut running = self.running.lock().await;
        if *running {
            return false;
        }
        *running = true;
        true
    }

    fn recover_stalled_jobs(&self) {
        match self.scheduler.recover_stalled_jobs() {
            Ok(0) => {}
            Ok(recovered) => info!(recovered, "Re-enqueued stalled jobs"),
            Err(e) => error!(error = %e, "Failed to recover stalled jobs"),
        }
    }

    async fn spawn_workers(&self, num_workers: usize) {
        info!(num_workers, "Starting chat workers");

        for worker_id in 0..num_workers {
            let worker = Worker::new(
                worker_id,
                self.scheduler.clone(),
                self.provider.clone(),
                self.job_delay,
                self.running.clone(),
            );

            tokio::spawn(async move {
                worker.run_worker_loop().await;
            });
        }
    }
}

struct Worker {
    id: usize,
    scheduler: Arc<Scheduler>,
    provider: Arc<dyn AssistantProvider>,
    job_delay: Duration,
    running: Arc<Mutex<bool>>,
}

impl Worker {
    fn new(
        id: usize,
        scheduler: Arc<Scheduler>,
        provider: Arc<dyn AssistantProvider>,
        job_delay: Duration,
        running: Arc<Mutex<bool>>,
    ) -> Self {
        Self {
            id,
            scheduler,
            provider,
            job_delay,
            running,
        }
    }

    async fn run_worker_loop(&self) {
        info!(worker_id = self.id, "Worker started");

        while *self.running.lock().await {
            match self.process_next_job().await {
                // Pace assistant traffic: one job, then a breather
                Ok(true) => tokio::time::sleep(self.job_delay).await,
                Ok(false) => {
                    // Recovery stays on one worker; concurrent passes could
                    // re-enqueue the same job twice
                    if self.id == 0 {
                        self.recover_stalled_jobs();
                    }
                    self.sweep_expired_results();
                }
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Worker error");
                    tokio::time::sleep(self.job_delay).await;
                }
            }
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    /// Returns whether a job was processed. A fatal queue error bubbles up;
    /// a failed assistant call is recorded on the job and is not an error
    /// of the loop itself.
    async fn process_next_job(&self) -> Result<bool> {
        let Some(job) = self
            .scheduler
            .pop_job(Duration::from_millis(IDLE_WAIT_MS))
            .await?
        else {
            return Ok(false);
        };

        debug!(worker_id = self.id, job_id = %job.id, "Processing chat job");

        let outcome = self
            .provider
            .run_chat(&job.message, job.conversation_token.as_deref())
            .await;

        match outcome {
            Ok(reply) => {
                if let Err(e) = self.scheduler.complete_job(&job.id, reply) {
                    warn!(job_id = %job.id, error = %e, "Failed to persist job completion");
                } else {
                    info!(job_id = %job.id, "Chat job completed");
                }
            }
            Err(err) => {
                let message = match &err {
                    AssistantError::Timeout { .. } => {
                        "The assistant timed out before completing a response".to_string()
                    }
                    other => format!("Assistant request failed: {}", other),
                };
                if let Err(e) = self.scheduler.fail_job(&job.id, message) {
                    warn!(job_id = %job.id, error = %e, "Failed to persist job failure");
                }
                error!(job_id = %job.id, error = %err, "Chat job failed");
            }
        }

        Ok(true)
    }

    /// A crash inside the lease is invisible to the startup pass, so idle
    /// passes keep re-checking for jobs whose lease has since lapsed.
    fn recover_stalled_jobs(&self) {
        match self.scheduler.recover_stalled_jobs() {
            Ok(0) => {}
            Ok(recovered) => info!(worker_id = self.id, recovered, "Re-enqueued stalled jobs"),
            Err(e) => warn!(worker_id = self.id, error = %e, "Failed to recover stalled jobs"),
        }
    }

    fn sweep_expired_results(&self) {
        match self.scheduler.purge_expired_results() {
            Ok(0) => {}
            Ok(purged) => debug!(worker_id = self.id, purged, "Purged expired results"),
            Err(e) => warn!(worker_id = self.id, error = %e, "Failed to purge expired results"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{ScriptedAssistant, ScriptedStep};
    use crate::engine::scheduler::JobView;
    use std::time::Instant;
    use uos_storage::MemoryJobStore;

    const TTL: Duration = Duration::from_secs(600);
    const LEASE: Duration = Duration::from_secs(60);

    fn scheduler_with(store: Arc<MemoryJobStore>) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(store, TTL, LEASE))
    }

    fn executor_with(scheduler: Arc<Scheduler>, script: Vec<ScriptedStep>) -> ChatExecutor {
        ChatExecutor::new(
            scheduler,
            Arc::new(ScriptedAssistant::from_steps(script)),
            1,
            Duration::from_millis(10),
        )
    }

    async fn wait_for_terminal(scheduler: &Scheduler, job_id: &str) -> JobView {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let view = scheduler.job_status(job_id).expect("status query");
            if matches!(view, JobView::Completed(_) | JobView::Failed(_)) {
                return view;
            }
            if Instant::now() >= deadline {
                panic!("job {} did not reach a terminal state, last view {:?}", job_id, view);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    #[tokio::test]
    async fn test_worker_completes_job() {
        let scheduler = scheduler_with(Arc::new(MemoryJobStore::new()));
        let executor = executor_with(scheduler.clone(), vec![ScriptedStep::reply("all systems go")]);

        let job_id = scheduler.submit_message("status?".to_string(), None).unwrap();
        executor.start().await;

        let view = wait_for_terminal(&scheduler, &job_id).await;
        match view {
            JobView::Completed(reply) => {
                assert_eq!(reply.text, "all systems go");
                assert_eq!(reply.conversation_token, "thread-scripted");
            }
            other => panic!("expected completion, got {other:?}"),
        }

        executor.stop().await;
    }

    #[tokio::test]
    async fn test_worker_records_assistant_failure() {
        let scheduler = scheduler_with(Arc::new(MemoryJobStore::new()));
        let executor = executor_with(
            scheduler.clone(),
            vec![ScriptedStep::failure("model offline")],
        );

        let job_id = scheduler.submit_message("status?".to_string(), None).unwrap();
        executor.start().await;

        let view = wait_for_terminal(&scheduler, &job_id).await;
        match view {
            JobView::Failed(error) => assert!(error.contains("model offline")),
            other => panic!("expected failure, got {other:?}"),
        }

        executor.stop().await;
    }

    #[tokio::test]
    async fn test_worker_records_timeout_as_failure() {
        let scheduler = scheduler_with(Arc::new(MemoryJobStore::new()));
        let executor = executor_with(scheduler.clone(), vec![ScriptedStep::timeout()]);

        let job_id = scheduler.submit_message("status?".to_string(), None).unwrap();
        executor.start().await;

        let view = wait_for_terminal(&scheduler, &job_id).await;
        match view {
            JobView::Failed(error) => assert!(error.contains("timed out")),
            other => panic!("expected failure, got {other:?}"),
        }

        executor.stop().await;
    }

    #[tokio::test]
    async fn test_jobs_processed_in_submission_order() {
        let scheduler = scheduler_with(Arc::new(MemoryJobStore::new()));
        let executor = executor_with(
            scheduler.clone(),
            vec![ScriptedStep::reply("reply-1"), ScriptedStep::reply("reply-2")],
        );

        let first = scheduler.submit_message("first".to_string(), None).unwrap();
        let second = scheduler.submit_message("second".to_string(), None).unwrap();
        executor.start().await;

        // Scripted replies are consumed in order, so the mapping proves FIFO
        let view = wait_for_terminal(&scheduler, &first).await;
        assert_eq!(view, JobView::Completed(crate::models::ChatReply {
            text: "reply-1".to_string(),
            conversation_token: "thread-scripted".to_string(),
        }));

        let view = wait_for_terminal(&scheduler, &second).await;
        assert_eq!(view, JobView::Completed(crate::models::ChatReply {
            text: "reply-2".to_string(),
            conversation_token: "thread-scripted".to_string(),
        }));

        executor.stop().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let scheduler = scheduler_with(Arc::new(MemoryJobStore::new()));
        let executor = executor_with(scheduler.clone(), vec![ScriptedStep::reply("once")]);

        executor.start().await;
        executor.start().await;
        assert!(executor.is_running().await);

        let job_id = scheduler.submit_message("hello".to_string(), None).unwrap();
        let view = wait_for_terminal(&scheduler, &job_id).await;
        assert!(matches!(view, JobView::Completed(_)));

        executor.stop().await;
        assert!(!executor.is_running().await);
    }

    #[tokio::test]
    async fn test_stopped_executor_leaves_jobs_queued() {
        let scheduler = scheduler_with(Arc::new(MemoryJobStore::new()));
        let executor = executor_with(scheduler.clone(), vec![]);

        executor.start().await;
        executor.stop().await;

        // Give the worker one idle wait to observe the flag and exit
        tokio::time::sleep(Duration::from_millis(1200)).await;

        let job_id = scheduler.submit_message("hello".to_string(), None).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(scheduler.job_status(&job_id).unwrap(), JobView::Queued);
    }

    #[tokio::test]
    async fn test_start_recovers_stalled_job() {
        let store = Arc::new(MemoryJobStore::new());
        // Zero lease makes any in-flight job count as stalled immediately
        let scheduler = Arc::new(Scheduler::new(store, TTL, Duration::ZERO));

        let job_id = scheduler.submit_message("hello".to_string(), None).unwrap();
        scheduler
            .pop_job(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scheduler.job_status(&job_id).unwrap(), JobView::Processing);

        tokio::time::sleep(Duration::from_millis(5)).await;

        let executor = executor_with(scheduler.clone(), vec![ScriptedStep::reply("recovered")]);
        executor.start().await;

        let view = wait_for_terminal(&scheduler, &job_id).await;
        match view {
            JobView::Completed(reply) => assert_eq!(reply.text, "recovered"),
            other => panic!("expected completion, got {other:?}"),
        }

        executor.stop().await;
    }

    #[tokio::test]
    async fn test_idle_pass_recovers_job_stalled_after_start() {
        let store = Arc::new(MemoryJobStore::new());
        let scheduler = Arc::new(Scheduler::new(store, TTL, Duration::from_millis(300)));

        let job_id = scheduler.submit_message("hello".to_string(), None).unwrap();
        scheduler
            .pop_job(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();

        // The job is still inside its lease here, so the startup pass skips it
        let executor = executor_with(scheduler.clone(), vec![ScriptedStep::reply("picked up")]);
        executor.start().await;
        assert_eq!(scheduler.job_status(&job_id).unwrap(), JobView::Processing);

        // The first idle pass lands after the lease lapses and re-queues it
        let view = wait_for_terminal(&scheduler, &job_id).await;
        match view {
            JobView::Completed(reply) => assert_eq!(reply.text, "picked up"),
            other => panic!("expected completion, got {other:?}"),
        }

        executor.stop().await;
    }
}
