//! HTTP 中间件
//! 请求 ID、请求追踪、速率限制、CORS、安全头、请求审计

pub mod audit;
pub mod cors;
pub mod rate_limit;
pub mod security;
pub mod tracking;

pub use audit::request_audit_middleware;
pub use cors::{cors_middleware, CorsPolicy};
pub use rate_limit::{rate_limit_middleware, RateLimitPolicy, RateLimiter};
pub use security::{panic_response, security_headers_middleware};
pub use tracking::{request_id_middleware, request_tracking_middleware, RequestId};

use axum::{extract::ConnectInfo, http::Request};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::{
    auth::{PasswordHasher, PasswordPolicy, TokenCodec},
    config::AppConfig,
    error::AppError,
    rabbitmq::SharedEventSink,
    services::{
        AuditService, PasswordService, PermissionService, RoleService, SessionService, UserService,
    },
    store::{LockoutPolicy, SharedStore},
};

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: sqlx::PgPool,
    pub store: SharedStore,
    pub tokens: Arc<TokenCodec>,
    pub session_service: Arc<SessionService>,
    pub password_service: Arc<PasswordService>,
    pub user_service: Arc<UserService>,
    pub role_service: Arc<RoleService>,
    pub permission_service: Arc<PermissionService>,
    pub audit_service: Arc<AuditService>,
}

impl AppState {
    /// 按配置组装所有服务
    pub fn new(
        config: Arc<AppConfig>,
        db: sqlx::PgPool,
        store: SharedStore,
        events: SharedEventSink,
    ) -> Result<Self, AppError> {
        let tokens = Arc::new(TokenCodec::from_config(&config.jwt)?);
        let hasher = Arc::new(PasswordHasher::from_config(&config.password)?);
        let policy = PasswordPolicy::from_config(&config.password);
        let lockout = LockoutPolicy {
            threshold: config.security.lockout_threshold,
            lockout_ttl: config.security.lockout_ttl,
            fail_window: config.security.fail_window_ttl,
        };

        let audit_service = Arc::new(AuditService::new(db.clone()));
        let session_service = Arc::new(SessionService::new(
            db.clone(),
            tokens.clone(),
            store.clone(),
            hasher.clone(),
            audit_service.clone(),
            lockout,
        ));
        let password_service = Arc::new(PasswordService::new(
            db.clone(),
            hasher.clone(),
            policy.clone(),
            config.password.history_size,
            config.password.reset_ttl,
            events,
            audit_service.clone(),
        ));
        let user_service = Arc::new(UserService::new(
            db.clone(),
            hasher,
            policy,
            config.password.history_size,
            audit_service.clone(),
        ));
        let role_service = Arc::new(RoleService::new(db.clone(), audit_service.clone()));
        let permission_service = Arc::new(PermissionService::new(db.clone()));

        Ok(Self {
            config,
            db,
            store,
            tokens,
            session_service,
            password_service,
            user_service,
            role_service,
            permission_service,
            audit_service,
        })
    }
}

/// 客户端地址：X-Forwarded-For 的第一项，其次是连接地址，否则 "unknown"
pub fn client_ip<B>(req: &Request<B>) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let req = Request::builder()
            .header("x-forwarded-for", "10.0.0.1, 172.16.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req), "10.0.0.1");
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 5000))));
        assert_eq!(client_ip(&req), "192.168.1.7");
    }

    #[test]
    fn test_client_ip_unknown() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&req), "unknown");
    }
}
