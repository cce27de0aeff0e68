//! CORS：允许列表支持 "*"、精确匹配与 "*.suffix"

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

const ALLOW_HEADERS: &str = "Authorization, Content-Type, X-Request-ID";
const ALLOW_METHODS: &str = "GET,POST,PUT,PATCH,DELETE,OPTIONS";

#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    allowed: Vec<String>,
}

fn origin_host(origin: &str) -> &str {
    let rest = origin.split_once("://").map(|(_, r)| r).unwrap_or(origin);
    let authority = rest.split('/').next().unwrap_or(rest);
    authority.rsplit_once(':').map(|(h, _)| h).unwrap_or(authority)
}

impl CorsPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        let allowed = allowed
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        Self { allowed }
    }

    /// 匹配时返回 Access-Control-Allow-Origin 的取值
    pub fn allow_origin(&self, origin: &str) -> Option<String> {
        for entry in &self.allowed {
            if entry == "*" {
                return Some("*".to_string());
            }
            if entry == origin {
                return Some(origin.to_string());
            }
            if let Some(suffix) = entry.strip_prefix("*.") {
                if origin_host(origin).ends_with(&format!(".{suffix}")) {
                    return Some(origin.to_string());
                }
            }
        }
        None
    }
}

pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    req: Request,
    next: Next,
) -> Response {
    let allowed = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .and_then(|origin| policy.allow_origin(origin));

    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    if let Some(value) = allowed.and_then(|v| HeaderValue::from_str(&v).ok()) {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
    }

    response
}
