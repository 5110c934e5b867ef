// src/api/mod.rs
//! Upstream API plumbing
//!
//! - Per-provider sliding-window rate limiting with 429 backoff
//! - Bounded retry with exponential backoff and Retry-After support
//! - An injectable HTTP transport for JSON endpoints

pub mod http;
pub mod rate_limiter;
pub mod retry;

pub use http::{parse_retry_after, HttpRequest, HttpTransport, ReqwestTransport};
pub use rate_limiter::{
    RateLimitConfig, RateLimitDecision, RateLimitStats, RateLimiter, RateLimiterManager,
};
pub use retry::{RetryContext, RetryOutcome, RetryPolicy};
