mod rate_limit;

pub use rate_limit::{RateLimiter, client_key};
