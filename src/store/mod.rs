//! 共享键值存储
//! 令牌吊销表、限流计数器与登录失败锁定都落在同一个 Redis 上

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("store operation timed out: {0}")]
    Timeout(&'static str),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 键值存储原语，由 Redis 与内存实现提供
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// INCR；结果为 1 时设置过期时间，返回自增后的值
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn delete(&self, keys: &[String]) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

pub fn revocation_key(jti: &str) -> String {
    format!("blacklist:jti:{jti}")
}

pub fn rate_limit_key(client: &str, method: &str, path: &str) -> String {
    format!("ratelimit:{client}:{method}:{path}")
}

pub fn login_failure_key(tenant_id: &str, email: &str) -> String {
    format!("loginfail:{tenant_id}:{email}")
}

pub fn lockout_key(tenant_id: &str, email: &str) -> String {
    format!("lockout:{tenant_id}:{email}")
}

// ==================== 令牌吊销 ====================

#[async_trait]
pub trait TokenRevocation: Send + Sync {
    /// 幂等；ttl 至少覆盖令牌剩余有效期
    async fn mark_revoked(&self, jti: &str, ttl: Duration) -> StoreResult<()>;

    async fn is_revoked(&self, jti: &str) -> StoreResult<bool>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> TokenRevocation for T {
    async fn mark_revoked(&self, jti: &str, ttl: Duration) -> StoreResult<()> {
        self.set_with_ttl(&revocation_key(jti), "revoked", ttl).await
    }

    async fn is_revoked(&self, jti: &str) -> StoreResult<bool> {
        self.exists(&revocation_key(jti)).await
    }
}

// ==================== 限流计数 ====================

#[async_trait]
pub trait RateCounter: Send + Sync {
    async fn hit(&self, key: &str, window: Duration) -> StoreResult<u64>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> RateCounter for T {
    async fn hit(&self, key: &str, window: Duration) -> StoreResult<u64> {
        self.incr_with_ttl(key, window).await
    }
}

// ==================== 登录失败锁定 ====================

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub lockout_ttl: Duration,
    pub fail_window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            lockout_ttl: Duration::from_secs(15 * 60),
            fail_window: Duration::from_secs(15 * 60),
        }
    }
}

#[async_trait]
pub trait LoginGuard: Send + Sync {
    async fn is_locked(&self, tenant_id: &str, email: &str) -> StoreResult<bool>;

    /// 记录一次失败；达到阈值时写入锁定键并返回 true
    async fn record_failure(
        &self,
        tenant_id: &str,
        email: &str,
        policy: &LockoutPolicy,
    ) -> StoreResult<bool>;

    async fn clear_failures(&self, tenant_id: &str, email: &str) -> StoreResult<()>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> LoginGuard for T {
    async fn is_locked(&self, tenant_id: &str, email: &str) -> StoreResult<bool> {
        self.exists(&lockout_key(tenant_id, email)).await
    }

    async fn record_failure(
        &self,
        tenant_id: &str,
        email: &str,
        policy: &LockoutPolicy,
    ) -> StoreResult<bool> {
        let failures = self
            .incr_with_ttl(&login_failure_key(tenant_id, email), policy.fail_window)
            .await?;

        if failures >= u64::from(policy.threshold) {
            self.set_with_ttl(&lockout_key(tenant_id, email), "1", policy.lockout_ttl)
                .await?;
            return Ok(true);
        }

        Ok(false)
    }

    async fn clear_failures(&self, tenant_id: &str, email: &str) -> StoreResult<()> {
        self.delete(&[
            login_failure_key(tenant_id, email),
            lockout_key(tenant_id, email),
        ])
        .await
    }
}
