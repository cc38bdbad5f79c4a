pub mod chat;
pub mod error;
pub mod market;
pub mod state;

pub use error::ApiError;
