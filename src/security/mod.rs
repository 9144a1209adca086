// Request-level protection applied to every route:
// rate limiting, HTML stripping of JSON bodies and request logging

pub mod rate_limit;
pub mod request_log;
pub mod sanitize;

pub use rate_limit::{
    rate_limit, MemoryRateLimitStore, RateLimitError, RateLimitStore, RateLimiter,
    RedisRateLimitStore,
};
pub use request_log::log_request;
pub use sanitize::sanitize_body;
