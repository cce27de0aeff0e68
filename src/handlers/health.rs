//! 健康检查

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use once_cell::sync::OnceCell;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{
    db,
    error::{codes, ErrorDetail, ErrorResponse},
    middleware::AppState,
    response::{ApiResponse, Meta},
    store::SharedStore,
};

static START_TIME: OnceCell<Instant> = OnceCell::new();

/// 记录进程启动时间
pub fn set_start_time() {
    let _ = START_TIME.set(Instant::now());
}

pub fn get_uptime() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

async fn store_status(store: &SharedStore) -> &'static str {
    match tokio::time::timeout(Duration::from_secs(2), store.ping()).await {
        Ok(Ok(())) => "ok",
        Ok(Err(e)) => {
            tracing::warn!("Redis health check failed: {}", e);
            "down"
        }
        Err(_) => {
            tracing::warn!("Redis health check timed out");
            "down"
        }
    }
}

/// 检查数据库与 Redis；任一不可用时返回 503
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (database, redis) = tokio::join!(db::health_check(&state.db), store_status(&state.store));
    db::record_pool_metrics(&state.db);

    let components = json!({
        "db": database.label(),
        "redis": redis,
        "uptime_secs": get_uptime(),
    });

    if database.is_healthy() && redis == "ok" {
        return ApiResponse::ok(components).into_response();
    }

    let body = ErrorResponse {
        success: false,
        error: ErrorDetail {
            code: codes::DEPENDENCY,
            message: "Service Unavailable".to_string(),
            details: Some(components),
        },
        meta: Meta::now(),
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}
