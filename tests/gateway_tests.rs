//! API 网关集成测试：本地起一个上游服务

use axum::{
    body::Body,
    extract::Request as AxumRequest,
    http::{header, Request, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::json;
use sisfo_auth::{
    auth::TokenCodec,
    gateway::{create_gateway_router, upstream::UpstreamGroup, GatewayState},
    store::{MemoryStore, SharedStore},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;
use uuid::Uuid;

mod common;
use common::{body_json, create_test_config};

/// 回显路径与转发头的上游
async fn spawn_upstream() -> String {
    async fn echo(req: AxumRequest) -> Json<serde_json::Value> {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Json(json!({
            "path": req.uri().path(),
            "query": req.uri().query(),
            "forwarded_for": header("x-forwarded-for"),
            "authorization": header("authorization"),
        }))
    }

    let app = Router::new()
        .route("/api/v1/health", get(|| async { "ok" }))
        .route("/api/v1/auth/boom", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .fallback(echo);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// 绑定后立即释放的端口，连接会被拒绝
async fn dead_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

struct Gateway {
    router: Router,
    tokens: Arc<TokenCodec>,
}

fn gateway(groups: &[(&str, Vec<String>)]) -> Gateway {
    let config = create_test_config();
    let tokens = Arc::new(TokenCodec::from_config(&config.jwt).unwrap());
    let groups: HashMap<String, Arc<UpstreamGroup>> = groups
        .iter()
        .map(|(name, urls)| (name.to_string(), Arc::new(UpstreamGroup::from_urls(name, urls))))
        .collect();

    let state = Arc::new(GatewayState::new(groups, tokens.clone()));
    let store: SharedStore = Arc::new(MemoryStore::new());
    Gateway {
        router: create_gateway_router(state, &config, store),
        tokens,
    }
}

#[tokio::test]
async fn test_public_route_is_proxied() {
    let upstream = spawn_upstream().await;
    let gw = gateway(&[("auth", vec![upstream])]);

    let response = gw
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/login?lang=id")
                .header("x-forwarded-for", "203.0.113.9")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["path"], "/api/v1/auth/login");
    assert_eq!(json["query"], "lang=id");
    assert!(json["forwarded_for"]
        .as_str()
        .unwrap()
        .starts_with("203.0.113.9"));
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let upstream = spawn_upstream().await;
    let gw = gateway(&[("academic", vec![upstream])]);

    let response = gw
        .router
        .oneshot(
            Request::builder()
                .uri("/api/v1/classes/7A")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_forwards_token() {
    let upstream = spawn_upstream().await;
    let gw = gateway(&[("academic", vec![upstream])]);
    let token = gw
        .tokens
        .issue_access(Uuid::new_v4(), "school-a", vec!["teacher".into()])
        .unwrap();

    let response = gw
        .router
        .oneshot(
            Request::builder()
                .uri("/api/v1/classes/7A")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["path"], "/api/v1/classes/7A");
    assert_eq!(json["authorization"], format!("Bearer {token}"));
}

#[tokio::test]
async fn test_missing_upstream_is_service_unavailable() {
    let gw = gateway(&[]);

    let response = gw
        .router
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unknown_prefix_is_service_unavailable() {
    let upstream = spawn_upstream().await;
    let gw = gateway(&[("auth", vec![upstream])]);

    let response = gw
        .router
        .oneshot(
            Request::builder()
                .uri("/api/v2/anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let gw = gateway(&[("auth", vec![dead_upstream().await])]);

    let response = gw
        .router
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"]["code"], "6002");
}

#[tokio::test]
async fn test_upstream_server_error_is_passed_through() {
    let upstream = spawn_upstream().await;
    let gw = gateway(&[("auth", vec![upstream])]);

    let response = gw
        .router
        .oneshot(
            Request::builder()
                .uri("/api/v1/auth/boom")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_gateway_health_reports_each_service() {
    let upstream = spawn_upstream().await;
    let gw = gateway(&[
        ("auth", vec![upstream]),
        ("finance", vec![dead_upstream().await]),
    ]);

    let response = gw
        .router
        .oneshot(
            Request::builder()
                .uri("/api/v1/gateway/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let services = &json["data"]["services"];
    assert_eq!(services["auth"]["up"], true);
    assert_eq!(services["finance"]["up"], false);
    assert_eq!(services["academic"]["error"], "no_upstream");
    assert_eq!(services.as_object().unwrap().len(), 8);
}
