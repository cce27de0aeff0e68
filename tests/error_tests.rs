//! 错误信封渲染测试

use axum::{http::StatusCode, response::IntoResponse};
use http_body_util::BodyExt;
use serde_json::Value;
use sisfo_auth::error::{AppError, ErrorResponse};
use validator::Validate;

async fn render(error: AppError) -> (StatusCode, Value) {
    let response = error.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_envelope_shape() {
    let (status, json) = render(AppError::NotFound("user".into())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "5002");
    assert_eq!(json["error"]["message"], "user not found");
    assert!(json["error"].get("details").is_none());
    assert!(json["meta"]["timestamp"].is_string());
    // 作用域外生成新的 request id
    assert!(uuid::Uuid::parse_str(json["meta"]["request_id"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_internal_errors_hide_detail() {
    let (status, json) = render(AppError::internal("connection string postgres://secret")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "1001");
    assert_eq!(json["error"]["message"], "Internal Server Error");
    assert!(!json.to_string().contains("secret"));
}

#[tokio::test]
async fn test_account_restriction_message_is_shown() {
    let (status, json) = render(AppError::AccountRestricted("account locked".into())).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "3001");
    assert_eq!(json["error"]["message"], "account locked");
}

#[tokio::test]
async fn test_dependency_error_lists_component() {
    let (status, json) = render(AppError::DependencyUnavailable("redis".into())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "6002");
    assert_eq!(json["error"]["details"], "redis");
}

#[derive(Validate)]
struct Signup {
    #[validate(email)]
    email: String,
}

#[tokio::test]
async fn test_validation_errors_become_details() {
    let errors = Signup {
        email: "not-an-email".into(),
    }
    .validate()
    .unwrap_err();

    let (status, json) = render(AppError::from(errors)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "4001");
    assert!(json["error"]["details"]["email"].is_array());
}

#[test]
fn test_error_response_from_error() {
    let body = ErrorResponse::from_error(&AppError::RateLimitExceeded);
    assert!(!body.success);
    assert_eq!(body.error.code, "6001");
    assert_eq!(body.error.message, "Too Many Requests");
}
