//! 反向代理：把请求转发到选中的上游

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue, Uri},
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;

use super::upstream::Upstream;
use crate::error::AppError;

pub const PROXY_TIMEOUT: Duration = Duration::from_secs(30);

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub type HttpClient = Client<HttpConnector, Body>;

pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// 去掉 Host 与逐跳头，其余头（包括 Authorization）原样转发
pub fn strip_hop_headers(headers: &mut HeaderMap) {
    headers.remove(header::HOST);
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

pub fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let name = HeaderName::from_static("x-forwarded-for");
    let value = match headers.get(&name).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {client_ip}"),
        _ => client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}

pub fn upstream_uri(base: &str, original: &Uri) -> Result<Uri, AppError> {
    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{base}{path_and_query}")
        .parse()
        .map_err(|e| AppError::Internal(format!("invalid upstream uri: {e}")))
}

pub async fn forward(
    client: &HttpClient,
    upstream: &Upstream,
    req: Request,
    client_ip: &str,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    parts.uri = upstream_uri(&upstream.base, &parts.uri)?;
    strip_hop_headers(&mut parts.headers);
    append_forwarded_for(&mut parts.headers, client_ip);

    let method = parts.method.clone();
    let target = parts.uri.clone();
    let outbound = Request::from_parts(parts, body);

    let result = tokio::time::timeout(PROXY_TIMEOUT, client.request(outbound)).await;

    let response: hyper::Response<hyper::body::Incoming> = match result {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            upstream.breaker.record_failure();
            tracing::warn!(upstream = %upstream.base, method = %method, uri = %target, error = %e, "Upstream request failed");
            return Err(AppError::Upstream(e.to_string()));
        }
        Err(_) => {
            upstream.breaker.record_failure();
            tracing::warn!(upstream = %upstream.base, method = %method, uri = %target, "Upstream request timed out");
            return Err(AppError::Upstream("timeout".to_string()));
        }
    };

    if response.status().is_server_error() {
        upstream.breaker.record_failure();
        tracing::warn!(
            upstream = %upstream.base,
            status = response.status().as_u16(),
            "Upstream returned server error"
        );
    }

    let (mut parts, body) = response.into_parts();
    strip_hop_headers(&mut parts.headers);
    Ok(Response::from_parts(parts, Body::new(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "gateway".parse().unwrap());
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer t".parse().unwrap());

        strip_hop_headers(&mut headers);
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer t");
    }

    #[test]
    fn test_append_forwarded_for() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1");

        append_forwarded_for(&mut headers, "10.0.0.2");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1, 10.0.0.2");
    }

    #[test]
    fn test_upstream_uri_keeps_path_and_query() {
        let original: Uri = "/api/v1/users?limit=5".parse().unwrap();
        let uri = upstream_uri("http://auth:8080", &original).unwrap();
        assert_eq!(uri.to_string(), "http://auth:8080/api/v1/users?limit=5");
    }
}
