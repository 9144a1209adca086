// Fixed-window request limiting keyed on the caller address

use axum::{
    async_trait,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::AppState;

/// Entries are pruned once the in-memory table grows past this size
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit store unavailable: {0}")]
    Store(String),
}

impl From<redis::RedisError> for RateLimitError {
    fn from(err: redis::RedisError) -> Self {
        RateLimitError::Store(err.to_string())
    }
}

/// Counter backend for the limiter
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Record one request for `key` and return the count in the current window
    async fn hit(&self, key: &str, window: Duration) -> Result<u64, RateLimitError>;
}

/// Per-process counters
#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<String, (Instant, u64)>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<u64, RateLimitError> {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| RateLimitError::Store("counter table poisoned".to_string()))?;

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, (started, _)| now.duration_since(*started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        Ok(entry.1)
    }
}

/// Raw counter commands behind the shared store
#[async_trait]
pub trait CounterCommands: Send + Sync {
    /// Increment `key` and read its remaining TTL in one atomic step.
    /// The TTL is negative when the key has no expiry.
    async fn incr_with_ttl(&self, key: &str) -> Result<(u64, i64), RateLimitError>;

    async fn expire(&self, key: &str, secs: u64) -> Result<(), RateLimitError>;
}

/// Redis connection speaking the counter commands
#[derive(Clone)]
pub struct RedisCounter {
    connection: ConnectionManager,
}

#[async_trait]
impl CounterCommands for RedisCounter {
    async fn incr_with_ttl(&self, key: &str) -> Result<(u64, i64), RateLimitError> {
        let mut connection = self.connection.clone();
        let (count, ttl): (u64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("TTL")
            .arg(key)
            .query_async(&mut connection)
            .await?;
        Ok((count, ttl))
    }

    async fn expire(&self, key: &str, secs: u64) -> Result<(), RateLimitError> {
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(secs)
            .query_async(&mut connection)
            .await?;
        Ok(())
    }
}

/// Fixed windows kept as expiring counters. Any hit that finds a counter
/// without a TTL sets one, so a lost EXPIRE cannot pin a caller forever.
pub struct ExpiringCounterStore<C> {
    commands: C,
}

/// Counters shared by every instance through Redis
pub type RedisRateLimitStore = ExpiringCounterStore<RedisCounter>;

impl<C: CounterCommands> ExpiringCounterStore<C> {
    pub fn new(commands: C) -> Self {
        Self { commands }
    }
}

impl ExpiringCounterStore<RedisCounter> {
    pub async fn connect(url: &str) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self::new(RedisCounter { connection }))
    }
}

#[async_trait]
impl<C: CounterCommands> RateLimitStore for ExpiringCounterStore<C> {
    async fn hit(&self, key: &str, window: Duration) -> Result<u64, RateLimitError> {
        let key = format!("rate_limit:{}", key);
        let (count, ttl) = self.commands.incr_with_ttl(&key).await?;
        if ttl < 0 {
            self.commands.expire(&key, window.as_secs().max(1)).await?;
        }
        Ok(count)
    }
}

/// Allows at most `max_requests` per caller per window
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    max_requests: u64,
    window: Duration,
    trust_proxy: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, max_requests: u64, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
            trust_proxy: false,
        }
    }

    /// Key callers on the first `X-Forwarded-For` hop. Only safe behind a
    /// proxy that overwrites the header.
    pub fn trusting_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    pub fn caller_key(&self, request: &Request) -> String {
        caller_key(request, self.trust_proxy)
    }

    /// A store failure lets the request through
    pub async fn check(&self, key: &str) -> Result<(), ApiError> {
        match self.store.hit(key, self.window).await {
            Ok(count) if count > self.max_requests => {
                warn!("Rate limit exceeded: caller={}, count={}", key, count);
                Err(ApiError::RateLimited)
            }
            Ok(count) => {
                debug!("Rate limit hit: caller={}, count={}", key, count);
                Ok(())
            }
            Err(err) => {
                error!("Rate limiting skipped: {}", err);
                Ok(())
            }
        }
    }
}

/// Socket address of the caller, or the first `X-Forwarded-For` hop when
/// the proxy is trusted
pub fn caller_key(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());

        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = state.rate_limiter.caller_key(&request);
    state.rate_limiter.check(&key).await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn hit(&self, _key: &str, _window: Duration) -> Result<u64, RateLimitError> {
            Err(RateLimitError::Store("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_memory_store_counts_per_key() {
        let store = MemoryRateLimitStore::new();
        let window = Duration::from_secs(60);

        assert_eq!(store.hit("a", window).await.unwrap(), 1);
        assert_eq!(store.hit("a", window).await.unwrap(), 2);
        assert_eq!(store.hit("b", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_resets_after_window() {
        let store = MemoryRateLimitStore::new();
        let window = Duration::from_millis(50);

        store.hit("a", window).await.unwrap();
        store.hit("a", window).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(store.hit("a", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_limiter_rejects_over_ceiling() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            2,
            Duration::from_secs(60),
        );

        assert!(limiter.check("10.0.0.1").await.is_ok());
        assert!(limiter.check("10.0.0.1").await.is_ok());
        assert!(matches!(
            limiter.check("10.0.0.1").await,
            Err(ApiError::RateLimited)
        ));
        assert!(limiter.check("10.0.0.2").await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_store_lets_requests_through() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore), 0, Duration::from_secs(60));
        assert!(limiter.check("10.0.0.1").await.is_ok());
    }

    /// Counter table standing in for Redis; the first EXPIRE can be made to fail
    #[derive(Default)]
    struct FakeCounter {
        keys: Mutex<HashMap<String, (u64, Option<u64>)>>,
        fail_next_expire: Mutex<bool>,
    }

    impl FakeCounter {
        fn ttl_of(&self, key: &str) -> Option<u64> {
            self.keys.lock().unwrap().get(key).and_then(|(_, ttl)| *ttl)
        }
    }

    #[async_trait]
    impl CounterCommands for Arc<FakeCounter> {
        async fn incr_with_ttl(&self, key: &str) -> Result<(u64, i64), RateLimitError> {
            let mut keys = self.keys.lock().unwrap();
            let entry = keys.entry(key.to_string()).or_insert((0, None));
            entry.0 += 1;
            Ok((entry.0, entry.1.map_or(-1, |ttl| ttl as i64)))
        }

        async fn expire(&self, key: &str, secs: u64) -> Result<(), RateLimitError> {
            let mut fail = self.fail_next_expire.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(RateLimitError::Store("connection reset".to_string()));
            }
            if let Some(entry) = self.keys.lock().unwrap().get_mut(key) {
                entry.1 = Some(secs);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_expiring_store_sets_window_on_prefixed_key() {
        let counter = Arc::new(FakeCounter::default());
        let store = ExpiringCounterStore::new(counter.clone());
        let window = Duration::from_secs(180);

        assert_eq!(store.hit("10.0.0.1", window).await.unwrap(), 1);
        assert_eq!(store.hit("10.0.0.1", window).await.unwrap(), 2);
        assert_eq!(counter.ttl_of("rate_limit:10.0.0.1"), Some(180));
    }

    #[tokio::test]
    async fn test_expiring_store_repairs_lost_expiry() {
        let counter = Arc::new(FakeCounter::default());
        *counter.fail_next_expire.lock().unwrap() = true;
        let store = ExpiringCounterStore::new(counter.clone());
        let window = Duration::from_secs(60);

        assert!(store.hit("10.0.0.1", window).await.is_err());
        assert_eq!(counter.ttl_of("rate_limit:10.0.0.1"), None);

        assert_eq!(store.hit("10.0.0.1", window).await.unwrap(), 2);
        assert_eq!(counter.ttl_of("rate_limit:10.0.0.1"), Some(60));
    }

    fn forwarded_request(addr: &str) -> Request {
        let mut request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = addr.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn test_caller_key_ignores_forwarded_header_by_default() {
        let request = forwarded_request("192.0.2.10:5000");
        assert_eq!(caller_key(&request, false), "192.0.2.10");
    }

    #[test]
    fn test_caller_key_uses_forwarded_header_behind_trusted_proxy() {
        let request = forwarded_request("192.0.2.10:5000");
        assert_eq!(caller_key(&request, true), "203.0.113.7");

        let limiter = RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            1,
            Duration::from_secs(60),
        )
        .trusting_proxy(true);
        assert_eq!(limiter.caller_key(&request), "203.0.113.7");
    }

    #[test]
    fn test_caller_key_falls_back_to_socket() {
        let mut request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(caller_key(&request, true), "unknown");

        let addr: SocketAddr = "192.0.2.10:5000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(caller_key(&request, false), "192.0.2.10");
    }
}
