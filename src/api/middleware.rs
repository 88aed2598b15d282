use crate::api::lyrics::AppState;
use crate::config::Config;
use crate::error::{AppError, Result};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

/// Counts hits per key inside a fixed window.
#[async_trait]
pub trait HitCounter: Send + Sync {
    /// Records one hit and returns the count so far in the current window.
    async fn hit(&self, key: &str, window_secs: u64) -> Result<u64>;
}

pub struct RedisHitCounter {
    redis: ConnectionManager,
}

impl RedisHitCounter {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl HitCounter for RedisHitCounter {
    async fn hit(&self, key: &str, window_secs: u64) -> Result<u64> {
        let mut conn = self.redis.clone();
        let key = format!("ratelimit:{}", key);

        let count: u64 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(window_secs)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }
        Ok(count)
    }
}

pub struct RateLimiter {
    counter: Arc<dyn HitCounter>,
    max: u64,
    trusted_max: u64,
    window_secs: u64,
    trusted_tokens: Vec<String>,
}

impl RateLimiter {
    pub fn new(config: &Config, counter: Arc<dyn HitCounter>) -> Self {
        Self {
            counter,
            max: config.rate_limit_max,
            trusted_max: config.rate_limit_trusted_max,
            window_secs: config.rate_limit_window_secs,
            trusted_tokens: config.trusted_tokens.clone(),
        }
    }

    /// Trusted bearer tokens get their own bucket and a higher ceiling; everyone else is keyed by address.
    fn key_and_limit(&self, token: Option<&str>, addr: Option<SocketAddr>) -> (String, u64) {
        match token {
            Some(token) if self.trusted_tokens.iter().any(|t| t == token) => {
                (format!("token:{}", token), self.trusted_max)
            }
            _ => {
                let ip = addr
                    .map(|a| a.ip().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                (format!("ip:{}", ip), self.max)
            }
        }
    }

    pub async fn check(&self, token: Option<&str>, addr: Option<SocketAddr>) -> Result<()> {
        let (key, limit) = self.key_and_limit(token, addr);
        let count = self.counter.hit(&key, self.window_secs).await?;

        if count > limit {
            tracing::warn!("Rate limit exceeded for {} ({} > {})", key, count, limit);
            return Err(AppError::RateLimited);
        }
        Ok(())
    }
}

/// Extractor that rejects the request once the caller's window is used up.
pub struct RateLimit;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RateLimit {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        state.limiter.check(token, addr).await?;
        Ok(RateLimit)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct MemoryHitCounter {
        hits: Mutex<HashMap<String, u64>>,
    }

    #[async_trait]
    impl HitCounter for MemoryHitCounter {
        async fn hit(&self, key: &str, _window_secs: u64) -> Result<u64> {
            let mut hits = self.hits.lock().await;
            let count = hits.entry(key.to_string()).or_insert(0);
            *count += 1;
            Ok(*count)
        }
    }

    pub(crate) fn limiter(max: u64, trusted: &[&str]) -> RateLimiter {
        RateLimiter {
            counter: Arc::new(MemoryHitCounter::default()),
            max,
            trusted_max: max * 10,
            window_secs: 60,
            trusted_tokens: trusted.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn addr(ip: &str) -> Option<SocketAddr> {
        Some(format!("{}:4000", ip).parse().unwrap())
    }

    #[test]
    fn test_key_prefers_trusted_token() {
        let limiter = limiter(5, &["vip"]);
        assert_eq!(
            limiter.key_and_limit(Some("vip"), addr("10.0.0.1")),
            ("token:vip".to_string(), 50)
        );
        assert_eq!(
            limiter.key_and_limit(Some("random"), addr("10.0.0.1")),
            ("ip:10.0.0.1".to_string(), 5)
        );
        assert_eq!(
            limiter.key_and_limit(None, None),
            ("ip:unknown".to_string(), 5)
        );
    }

    #[tokio::test]
    async fn test_rejects_after_limit_per_address() {
        let limiter = limiter(2, &[]);
        assert!(limiter.check(None, addr("10.0.0.1")).await.is_ok());
        assert!(limiter.check(None, addr("10.0.0.1")).await.is_ok());
        assert!(matches!(
            limiter.check(None, addr("10.0.0.1")).await,
            Err(AppError::RateLimited)
        ));
        assert!(limiter.check(None, addr("10.0.0.2")).await.is_ok());
    }
}
