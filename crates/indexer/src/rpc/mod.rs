//! Resilient RPC client layer.
//!
//! - [`EndpointPool`]: ordered endpoints per chain with failover
//! - [`RateLimiter`]: token bucket plus in-flight bound
//! - [`TransientError`]: which failures rotate the pool

pub mod errors;
pub mod limiter;
pub mod pool;

pub use errors::TransientError;
pub use limiter::RateLimiter;
pub use pool::{mask_url, Endpoint, EndpointPool};
