//! 用户管理的 HTTP 处理器

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::ApiJson;
use crate::{
    auth::AuthContext,
    error::AppError,
    middleware::AppState,
    models::{role::AssignRoleRequest, user::*, Pagination},
    response::ApiResponse,
};

/// 列出租户内用户
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require(&auth_context, "users:read")
        .await?;

    let users = state.user_service.list(&auth_context, page).await?;
    Ok(ApiResponse::ok(users))
}

/// 创建用户
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require(&auth_context, "users:write")
        .await?;

    let user = state.user_service.create(&auth_context, req).await?;
    Ok(ApiResponse::created(user))
}

/// 获取用户详情
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require(&auth_context, "users:read")
        .await?;

    let user = state.user_service.get(&auth_context, id).await?;
    Ok(ApiResponse::ok(user))
}

/// 更新用户
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require(&auth_context, "users:write")
        .await?;

    let user = state.user_service.update(&auth_context, id, req).await?;
    Ok(ApiResponse::ok(user))
}

/// 删除用户
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require(&auth_context, "users:write")
        .await?;

    state.user_service.delete(&auth_context, id).await?;
    Ok(ApiResponse::ok(json!({ "message": "user deleted" })))
}

pub async fn list_user_roles(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require(&auth_context, "roles:read")
        .await?;

    let roles = state.role_service.list_user_roles(&auth_context, id).await?;
    Ok(ApiResponse::ok(roles))
}

pub async fn assign_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<AssignRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require(&auth_context, "roles:write")
        .await?;

    let role = state.role_service.assign(&auth_context, id, req).await?;
    Ok(ApiResponse::ok(role))
}

pub async fn unassign_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path((id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require(&auth_context, "roles:write")
        .await?;

    state
        .role_service
        .unassign(&auth_context, id, role_id)
        .await?;
    Ok(ApiResponse::ok(json!({ "message": "role unassigned" })))
}
