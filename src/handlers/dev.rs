//! 开发环境专用：快速创建带角色和权限的账号

use axum::{extract::State, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;

use super::ApiJson;
use crate::{
    error::AppError,
    middleware::AppState,
    models::{auth::BootstrapUserRequest, user::normalize_email},
    repository::UserRepository,
    response::ApiResponse,
};

pub async fn bootstrap_user(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<BootstrapUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !state.config.server.is_development() {
        return Err(AppError::NotFound("route".to_string()));
    }

    let tenant_id = req.tenant_id.trim();
    if tenant_id.is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "tenant_id, email and password are required".to_string(),
        ));
    }

    let existing = UserRepository::new(state.db.clone())
        .find_by_email(tenant_id, &normalize_email(&req.email))
        .await?;
    let user = match existing {
        Some(user) => user,
        None => {
            state
                .user_service
                .provision(tenant_id, &req.email, &req.password)
                .await?
        }
    };

    let mut roles = Vec::with_capacity(req.roles.len());
    for name in &req.roles {
        let role = state.role_service.assign_by_name(tenant_id, user.id, name).await?;
        for permission in &req.permissions {
            state.role_service.grant_permission(role.id, permission).await?;
        }
        roles.push(role.name);
    }

    tracing::info!(user_id = %user.id, tenant_id, "Development user bootstrapped");

    Ok(ApiResponse::created(json!({
        "user_id": user.id,
        "tenant_id": user.tenant_id,
        "email": user.email,
        "roles": roles,
        "permissions": req.permissions,
    })))
}
