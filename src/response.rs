//! 统一响应信封
//! 成功: {success, data, meta}；失败见 error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

tokio::task_local! {
    /// 当前请求的 request id，由 request-id 中间件在请求作用域内设置
    pub static REQUEST_ID: String;
}

/// 读取当前请求的 request id；作用域外（后台任务等）生成新的
pub fn current_request_id() -> String {
    REQUEST_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: current_request_id(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub meta: Meta,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_status(StatusCode::OK, data)
    }

    pub fn created(data: T) -> Self {
        Self::with_status(StatusCode::CREATED, data)
    }

    pub fn with_status(status: StatusCode, data: T) -> Self {
        Self {
            success: true,
            data,
            meta: Meta::now(),
            status,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_id_from_scope() {
        let id = REQUEST_ID
            .scope("req-123".to_string(), async { current_request_id() })
            .await;
        assert_eq!(id, "req-123");
    }

    #[test]
    fn test_request_id_outside_scope_is_generated() {
        let id = current_request_id();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::ok(serde_json::json!({"ok": true}))).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["ok"], true);
        assert!(body["meta"]["timestamp"].is_string());
        assert!(body["meta"]["request_id"].is_string());
        assert!(body.get("status").is_none());
    }
}
