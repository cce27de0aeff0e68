//! 认证相关的 HTTP 处理器

use axum::{body::Bytes, extract::State, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;

use super::ApiJson;
use crate::{
    auth::AuthContext,
    error::AppError,
    middleware::AppState,
    models::auth::*,
    response::ApiResponse,
};

fn message(text: &str) -> ApiResponse<serde_json::Value> {
    ApiResponse::ok(json!({ "message": text }))
}

/// 用户登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state.session_service.login(req).await?;
    Ok(ApiResponse::ok(pair))
}

/// 刷新令牌
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state.session_service.refresh(&req.refresh_token).await?;
    Ok(ApiResponse::ok(pair))
}

/// 登出；请求体可省略
pub async fn logout(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let req: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();
    state
        .session_service
        .logout(req.refresh_token.as_deref())
        .await;
    message("logged out")
}

/// 获取当前用户信息
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let me = state.session_service.me(auth_context.user_id).await?;
    Ok(ApiResponse::ok(me))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .password_service
        .change_password(auth_context.user_id, &req.old_password, &req.new_password)
        .await?;
    Ok(message("password changed"))
}

/// 始终返回成功，避免暴露账号是否存在
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = state
        .password_service
        .forgot_password(&req.tenant_id, &req.email)
        .await?;

    let reset_token = token.filter(|_| state.config.server.exposes_reset_token());
    Ok(ApiResponse::ok(ForgotPasswordResponse {
        message: "if the account exists, a reset link has been sent".to_string(),
        reset_token,
    }))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .password_service
        .reset_password(&req.token, &req.password)
        .await?;
    Ok(message("password reset"))
}
