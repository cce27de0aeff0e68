//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

use crate::{
    auth::{jwt_auth_middleware, require_permission_middleware, PermissionGate},
    handlers,
    middleware::{
        cors_middleware, panic_response, rate_limit_middleware, request_audit_middleware,
        request_id_middleware, request_tracking_middleware, security_headers_middleware, AppState,
        CorsPolicy, RateLimitPolicy, RateLimiter,
    },
};

/// 请求体上限
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    let rate_limiter = Arc::new(RateLimiter::new(
        state.store.clone(),
        RateLimitPolicy::from_config(&state.config.rate_limit),
    ));
    let cors = Arc::new(CorsPolicy::new(state.config.security.cors_allowed_origins.clone()));
    let audit_gate = PermissionGate::new(state.permission_service.clone(), "audit:read");

    // 公开端点
    let public_routes = Router::new()
        .route("/api/v1/health", get(handlers::health::health_check))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route("/api/v1/auth/refresh", post(handlers::auth::refresh_token))
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .route("/api/v1/auth/forgot-password", post(handlers::auth::forgot_password))
        .route("/api/v1/auth/reset-password", post(handlers::auth::reset_password))
        .route("/api/v1/auth/dev/bootstrap-user", post(handlers::dev::bootstrap_user));

    // 审计日志（需要 audit:read）
    let audit_routes = Router::new()
        .route("/api/v1/audit-logs", get(handlers::audit::list_audit_logs))
        .route("/api/v1/audit-logs/search", get(handlers::audit::search_audit_logs))
        .route("/api/v1/audit-logs/export", get(handlers::audit::export_audit_logs))
        .route_layer(from_fn_with_state(audit_gate, require_permission_middleware));

    // 需要认证的路由
    let authenticated_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::auth::get_current_user))
        .route("/api/v1/auth/change-password", post(handlers::auth::change_password))
        .route(
            "/api/v1/users",
            get(handlers::user::list_users).post(handlers::user::create_user),
        )
        .route(
            "/api/v1/users/{id}",
            get(handlers::user::get_user)
                .put(handlers::user::update_user)
                .delete(handlers::user::delete_user),
        )
        .route(
            "/api/v1/users/{id}/roles",
            get(handlers::user::list_user_roles).post(handlers::user::assign_role),
        )
        .route(
            "/api/v1/users/{id}/roles/{role_id}",
            axum::routing::delete(handlers::user::unassign_role),
        )
        .merge(audit_routes)
        .route_layer(from_fn_with_state(state.tokens.clone(), jwt_auth_middleware));

    // 组合所有路由；最后添加的 layer 最先执行
    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn_with_state(
            state.audit_service.clone(),
            request_audit_middleware,
        ))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn_with_state(cors, cors_middleware))
        .layer(from_fn_with_state(rate_limiter, rate_limit_middleware))
        .layer(from_fn(request_tracking_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}
