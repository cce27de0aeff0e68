//! 请求审计：认证后的每个请求写一条 http.request

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    auth::AuthContext,
    models::audit::{AuditAction, NewAuditLog},
    services::AuditService,
};

/// 认证上下文由内层的认证中间件写入响应扩展；匿名请求不记录
pub async fn request_audit_middleware(
    State(audit): State<Arc<AuditService>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let start = Instant::now();

    let response = next.run(req).await;

    if let Some(ctx) = response.extensions().get::<AuthContext>() {
        audit.spawn(
            NewAuditLog::new(AuditAction::HttpRequest, ctx.tenant_id.as_str())
                .user(Some(ctx.user_id))
                .resource("http", None)
                .payload(json!({
                    "method": method,
                    "path": path,
                    "status": response.status().as_u16(),
                    "duration_ms": start.elapsed().as_millis() as u64,
                })),
        );
    }

    response
}
