//! 审计日志查询与导出
//! 权限 audit:read 由路由层检查

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use std::sync::Arc;

use crate::{
    auth::AuthContext,
    error::AppError,
    middleware::AppState,
    models::audit::{AuditLogPage, AuditLogQuery},
    response::ApiResponse,
    services::audit_service::render_csv,
};

/// 单次导出的最大行数
pub const EXPORT_LIMIT: i64 = 10_000;

pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(query): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = query.to_filter()?;
    let (limit, offset) = query.pagination().normalize();

    let (items, total) = state
        .audit_service
        .list(&auth_context.tenant_id, &filter, limit, offset)
        .await?;

    Ok(ApiResponse::ok(AuditLogPage {
        items,
        total,
        limit,
        offset,
    }))
}

pub async fn search_audit_logs(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(query): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::BadRequest("q is required".to_string()))?;
    let (limit, offset) = query.pagination().normalize();

    let (items, total) = state
        .audit_service
        .search(&auth_context.tenant_id, q, limit, offset)
        .await?;

    Ok(ApiResponse::ok(AuditLogPage {
        items,
        total,
        limit,
        offset,
    }))
}

pub async fn export_audit_logs(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(query): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = query.to_filter()?;

    let (logs, total) = state
        .audit_service
        .list(&auth_context.tenant_id, &filter, EXPORT_LIMIT, 0)
        .await?;
    if total > EXPORT_LIMIT {
        tracing::warn!(total, limit = EXPORT_LIMIT, "Audit export truncated");
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"audit_logs.csv\"",
            ),
        ],
        render_csv(&logs),
    ))
}
