//! 统一错误模型
//! 定义所有错误类型以及错误信封的渲染方式

use crate::response::Meta;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// 错误码（字符串形式，与 HTTP 状态码相互独立）
pub mod codes {
    pub const INTERNAL: &str = "1001";
    pub const UNAUTHORIZED: &str = "2001";
    pub const FORBIDDEN: &str = "3001";
    pub const INVALID_INPUT: &str = "4001";
    pub const CONFLICT: &str = "5001";
    pub const NOT_FOUND: &str = "5002";
    pub const RATE_LIMITED: &str = "6001";
    pub const DEPENDENCY: &str = "6002";
}

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    /// 账号被禁用或锁定，消息可直接返回给客户端
    #[error("Account restricted: {0}")]
    AccountRestricted(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(Value),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("No upstream available")]
    NoUpstream,

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::AccountRestricted(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::DependencyUnavailable(_) | AppError::NoUpstream => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Store(_)
            | AppError::Config(_)
            | AppError::Timeout(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => codes::UNAUTHORIZED,
            AppError::Forbidden | AppError::AccountRestricted(_) => codes::FORBIDDEN,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => codes::INVALID_INPUT,
            AppError::Conflict(_) => codes::CONFLICT,
            AppError::RateLimitExceeded => codes::RATE_LIMITED,
            AppError::DependencyUnavailable(_) | AppError::Upstream(_) => codes::DEPENDENCY,
            AppError::Database(e) if is_unique_violation(e) => codes::CONFLICT,
            AppError::NoUpstream
            | AppError::Database(_)
            | AppError::Store(_)
            | AppError::Config(_)
            | AppError::Timeout(_)
            | AppError::Internal(_) => codes::INTERNAL,
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthorized => "Unauthorized".to_string(),
            AppError::Forbidden => "Forbidden".to_string(),
            AppError::AccountRestricted(msg) => msg.clone(),
            AppError::NotFound(what) => format!("{what} not found"),
            AppError::BadRequest(_) | AppError::Validation(_) => "Invalid Input".to_string(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::Database(e) if is_unique_violation(e) => "Resource already exists".to_string(),
            AppError::RateLimitExceeded => "Too Many Requests".to_string(),
            AppError::DependencyUnavailable(_) => "Service Unavailable".to_string(),
            AppError::Upstream(_) => "Bad Gateway".to_string(),
            AppError::NoUpstream => "Service Unavailable".to_string(),
            AppError::Database(_)
            | AppError::Store(_)
            | AppError::Config(_)
            | AppError::Timeout(_)
            | AppError::Internal(_) => "Internal Server Error".to_string(),
        }
    }

    /// 附加在 error.details 中的信息，只对客户端可修正的错误提供
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::BadRequest(reason) => Some(Value::String(reason.clone())),
            AppError::Validation(details) => Some(details.clone()),
            AppError::DependencyUnavailable(what) => Some(Value::String(what.clone())),
            _ => None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

/// PostgreSQL 唯一约束冲突 (23505)
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// 错误信封
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
    pub meta: Meta,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn from_error(err: &AppError) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: err.code(),
                message: err.user_message(),
                details: err.details(),
            },
            meta: Meta::now(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::from_error(&self);

        if status.is_server_error() {
            tracing::error!(
                code = body.error.code,
                error = %self,
                request_id = %body.meta.request_id,
                "Request failed"
            );
        } else {
            tracing::warn!(
                code = body.error.code,
                error = %self,
                request_id = %body.meta.request_id,
                "Request rejected"
            );
        }

        (status, Json(body)).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = serde_json::to_value(&errors)
            .unwrap_or_else(|_| Value::String(errors.to_string()));
        AppError::Validation(details)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
