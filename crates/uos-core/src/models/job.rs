use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Terminal payload of a successful chat job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub text: String,
    /// Opaque continuation handle issued by the assistant backend.
    pub conversation_token: String,
}

/// One queued chat request, serialized through the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatJob {
    pub id: String,
    pub message: String,
    pub conversation_token: Option<String>,
    pub status: JobStatus,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Result retention deadline in epoch milliseconds.
    pub expires_at: Option<i64>,
    pub response: Option<ChatReply>,
    pub error: Option<String>,
}

impl ChatJob {
    pub fn new(message: String, conversation_token: Option<String>) -> Self {
        // Nanosecond precision keeps queue order stable under concurrent intake
        let created_at = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_else(|| {
            // Fallback for year > 2262 (extremely unlikely)
            chrono::Utc::now().timestamp_millis() * 1_000_000
        });

        Self {
            id: Uuid::new_v4().to_string(),
            message,
            conversation_token,
            status: JobStatus::Queued,
            created_at,
            started_at: None,
            completed_at: None,
            expires_at: None,
            response: None,
            error: None,
        }
    }

    /// Mark the job as picked up by a worker.
    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(chrono::Utc::now().timestamp_millis());
    }

    /// Mark the job as completed and stamp its retention deadline.
    pub fn complete(&mut self, reply: ChatReply, retention_ms: i64) {
        let now = chrono::Utc::now().timestamp_millis();
        self.status = JobStatus::Completed;
        self.completed_at = Some(now);
        self.expires_at = Some(now + retention_ms);
        self.response = Some(reply);
    }

    /// Mark the job as failed and stamp its retention deadline.
    pub fn fail(&mut self, error: String, retention_ms: i64) {
        let now = chrono::Utc::now().timestamp_millis();
        self.status = JobStatus::Failed;
        self.completed_at = Some(now);
        self.expires_at = Some(now + retention_ms);
        self.error = Some(error);
    }

    /// Get priority for queue ordering (lower timestamp = higher priority)
    pub fn priority(&self) -> u64 {
        self.created_at as u64
    }

    /// Whether the retention deadline has passed.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|deadline| now_ms >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_queued() {
        let job = ChatJob::new("hello".to_string(), None);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.started_at.is_none());
        assert!(job.expires_at.is_none());
        assert!(job.created_at > 0);
    }

    #[test]
    fn test_priority_follows_creation_order() {
        let first = ChatJob::new("first".to_string(), None);
        let second = ChatJob::new("second".to_string(), None);
        assert!(first.priority() <= second.priority());
    }

    #[test]
    fn test_complete_sets_retention_deadline() {
        let mut job = ChatJob::new("hello".to_string(), None);
        job.start();
        assert_eq!(job.status, JobStatus::Processing);

        let reply = ChatReply {
            text: "hi".to_string(),
            conversation_token: "thread-1".to_string(),
        };
        job.complete(reply, 600_000);

        assert_eq!(job.status, JobStatus::Completed);
        let completed_at = job.completed_at.unwrap();
        assert_eq!(job.expires_at.unwrap(), completed_at + 600_000);
        assert!(!job.is_expired(completed_at));
        assert!(job.is_expired(completed_at + 600_000));
    }

    #[test]
    fn test_fail_records_error() {
        let mut job = ChatJob::new("hello".to_string(), None);
        job.start();
        job.fail("assistant unavailable".to_string(), 1_000);

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("assistant unavailable"));
        assert!(job.response.is_none());
    }
}
