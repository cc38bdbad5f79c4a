pub mod job_queue;
pub mod memory;
pub mod store;

pub use job_queue::RedbJobStore;
pub use memory::MemoryJobStore;
pub use store::{JobStore, StoreBackend, open_store};
