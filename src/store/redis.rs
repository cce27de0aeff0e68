//! Redis-backed store shared by the auth service and the gateway.

use super::{KeyValueStore, StoreError, StoreResult};
use ::redis::{aio::ConnectionManager, Client};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Per-command deadline.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(url)?;

        // ConnectionManager reconnects on its own after a dropped connection
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            StoreError::Unavailable(e.to_string())
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            manager,
            op_timeout: DEFAULT_OP_TIMEOUT,
        })
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, ::redis::RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(op)),
        }
    }
}

/// Redis 的 EX 参数以秒为单位，且必须为正
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let mut conn = self.manager.clone();

        let count: u64 = self
            .bounded("INCR", ::redis::cmd("INCR").arg(key).query_async(&mut conn))
            .await?;

        if count == 1 {
            let _: bool = self
                .bounded(
                    "EXPIRE",
                    ::redis::cmd("EXPIRE")
                        .arg(key)
                        .arg(ttl_secs(ttl))
                        .query_async(&mut conn),
                )
                .await?;
        }

        Ok(count)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        self.bounded(
            "SET",
            ::redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_secs(ttl))
                .query_async(&mut conn),
        )
        .await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        self.bounded("EXISTS", ::redis::cmd("EXISTS").arg(key).query_async(&mut conn))
            .await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let _: u64 = self
            .bounded("DEL", ::redis::cmd("DEL").arg(keys).query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: String = self
            .bounded("PING", ::redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}
