//! 分布式速率限制
//!
//! 计数器保存在共享存储中，按 客户端 + 方法 + 路径 计数，窗口 60 秒

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::RateLimitConfig,
    error::AppError,
    middleware::client_ip,
    store::{rate_limit_key, RateCounter, SharedStore},
};

pub const RATE_WINDOW: Duration = Duration::from_secs(60);
pub const RATE_LIMIT_DEADLINE: Duration = Duration::from_secs(2);
pub const AUTH_PREFIX: &str = "/api/v1/auth/";

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub read_limit: u32,
    pub write_limit: u32,
    /// 按插入顺序匹配的路径前缀
    pub overrides: Vec<(String, u32)>,
    pub ceiling: Option<u32>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            read_limit: 100,
            write_limit: 30,
            overrides: vec![(AUTH_PREFIX.to_string(), 5)],
            ceiling: None,
        }
    }
}

impl RateLimitPolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            read_limit: config.read_per_minute,
            write_limit: config.write_per_minute,
            overrides: vec![(AUTH_PREFIX.to_string(), config.auth_per_minute)],
            ceiling: config.per_minute,
        }
    }

    pub fn limit_for(&self, method: &Method, path: &str) -> u32 {
        let base = self
            .overrides
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, limit)| *limit)
            .unwrap_or_else(|| {
                if method == Method::GET || method == Method::HEAD {
                    self.read_limit
                } else {
                    self.write_limit
                }
            });

        match self.ceiling {
            Some(ceiling) => base.min(ceiling),
            None => base,
        }
    }
}

pub struct RateLimiter {
    store: SharedStore,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: SharedStore, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// 超限返回 RateLimitExceeded；存储故障时拒绝请求
    pub async fn check(&self, client: &str, method: &Method, path: &str) -> Result<(), AppError> {
        let limit = self.policy.limit_for(method, path);
        let key = rate_limit_key(client, method.as_str(), path);

        let count = tokio::time::timeout(RATE_LIMIT_DEADLINE, self.store.hit(&key, RATE_WINDOW))
            .await
            .map_err(|_| AppError::Timeout("rate limiter".to_string()))??;

        if count > u64::from(limit) {
            metrics::counter!("rate_limit_rejections_total").increment(1);
            tracing::warn!(client, method = %method, path, count, limit, "Rate limit exceeded");
            return Err(AppError::RateLimitExceeded);
        }

        Ok(())
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_ip(&req);
    limiter
        .check(&client, req.method(), req.uri().path())
        .await?;

    Ok(next.run(req).await)
}
