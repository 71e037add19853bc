//! Cache facade (spec §4.C)
//!
//! Uniform get/put over the Redis-backed persistent store, with a global
//! bypass switch and "errors/timeouts are misses" read semantics: a read
//! never blocks or fails the request it's serving.

use std::time::Duration;

use deadpool_redis::{Config as DeadpoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

use crate::config::RedisConfig;
use crate::error::Result;

pub async fn create_pool_with_retries(config: &RedisConfig) -> Result<Pool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(attempt = attempt + 1, "redis connection established");
                } else {
                    tracing::info!(max_connections = config.max_connections, "redis pool created");
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;
                if attempt > config.max_retries {
                    tracing::error!(attempts = attempt, error = %e, "redis connection failed permanently");
                    return Err(e);
                }
                let delay = base_delay * 2_u32.pow(attempt.saturating_sub(1));
                tracing::warn!(attempt, error = %e, delay = ?delay, "redis connection attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn try_create_pool(config: &RedisConfig) -> Result<Pool> {
    let cfg = DeadpoolConfig::from_url(&config.url);
    let pool = cfg
        .builder()?
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()?;

    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(pool)
}

impl From<deadpool_redis::BuildError> for crate::error::GatewayError {
    fn from(e: deadpool_redis::BuildError) -> Self {
        crate::error::GatewayError::error("api.unknown_error")
            .with_status(500)
            .with_data(serde_json::json!({ "message": format!("redis pool build error: {e}") }))
    }
}

impl From<deadpool_redis::PoolError> for crate::error::GatewayError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        crate::error::GatewayError::error("api.unknown_error")
            .with_status(500)
            .with_data(serde_json::json!({ "message": format!("redis pool error: {e}") }))
    }
}

/// Facade over the persistent Redis store. Reads silently degrade to `None`
/// on any error or timeout; writes are the caller's responsibility to route
/// through `BackgroundWorker` so they survive past the response.
#[derive(Clone)]
pub struct Cache {
    pool: Pool,
    bypass: bool,
    read_timeout: Duration,
}

impl Cache {
    pub fn new(pool: Pool, bypass: bool) -> Self {
        Self { pool, bypass, read_timeout: Duration::from_millis(500) }
    }

    /// Deserialize whatever is stored at `key`, or `None` on miss, bypass, or
    /// any error/timeout.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if self.bypass {
            return None;
        }
        let fut = self.get_raw(key);
        match tokio::time::timeout(self.read_timeout, fut).await {
            Ok(Ok(Some(raw))) => serde_json::from_str(&raw).ok(),
            _ => None,
        }
    }

    async fn get_raw(&self, key: &str) -> redis::RedisResult<Option<String>> {
        let mut conn = self.pool.get().await.map_err(|e| {
            redis::RedisError::from(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        conn.get(key).await
    }

    /// Write `value` at `key` with the given TTL. Errors are logged, never
    /// propagated — cache writes are advisory.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(serialized) = serde_json::to_string(value) else {
            tracing::warn!(key, "failed to serialize cache value");
            return;
        };
        let pool = self.pool.clone();
        let key = key.to_string();
        let ttl_secs = ttl.as_secs();
        match pool.get().await {
            Ok(mut conn) => {
                let result: redis::RedisResult<()> =
                    conn.set_ex(&key, serialized, ttl_secs).await;
                if let Err(e) = result {
                    tracing::warn!(key, error = %e, "cache put failed");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "cache put failed: could not get connection"),
        }
    }

    pub fn bypass(&self) -> bool {
        self.bypass
    }

    /// Write `value` at `key` with no expiry. Used for the token manager's
    /// single `tokens` blob, which is mutated rather than TTL-bound.
    pub async fn put_forever<T: Serialize>(&self, key: &str, value: &T) {
        let Ok(serialized) = serde_json::to_string(value) else {
            tracing::warn!(key, "failed to serialize cache value");
            return;
        };
        match self.pool.get().await {
            Ok(mut conn) => {
                let result: redis::RedisResult<()> = conn.set(key, serialized).await;
                if let Err(e) = result {
                    tracing::warn!(key, error = %e, "durable cache put failed");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "durable cache put failed: could not get connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_read_timeout_is_sub_second() {
        let pool = DeadpoolConfig::from_url("redis://127.0.0.1:6379").create_pool(Some(Runtime::Tokio1)).unwrap();
        let cache = Cache::new(pool, false);
        assert!(cache.read_timeout < Duration::from_secs(1));
        assert!(!cache.bypass());
    }

    #[test]
    fn bypass_flag_is_carried() {
        let pool = DeadpoolConfig::from_url("redis://127.0.0.1:6379").create_pool(Some(Runtime::Tokio1)).unwrap();
        let cache = Cache::new(pool, true);
        assert!(cache.bypass());
    }
}
