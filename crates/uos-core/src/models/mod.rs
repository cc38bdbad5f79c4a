pub mod job;

pub use job::{ChatJob, ChatReply, JobStatus};
