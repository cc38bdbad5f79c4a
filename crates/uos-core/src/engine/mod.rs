pub mod executor;
pub mod scheduler;

pub use executor::ChatExecutor;
pub use scheduler::{JobView, Scheduler};
