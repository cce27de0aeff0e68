//! 网关健康检查：逐个探测上游的 /api/v1/health

use axum::{body::Body, http::Request};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{proxy::HttpClient, upstream::UpstreamGroup};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const HEALTH_PATH: &str = "/api/v1/health";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceHealth {
    pub up: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GatewayHealth {
    pub services: BTreeMap<String, ServiceHealth>,
}

async fn probe(client: &HttpClient, base: &str) -> Result<u16, String> {
    let req = Request::get(format!("{base}{HEALTH_PATH}"))
        .body(Body::empty())
        .map_err(|e| e.to_string())?;

    match tokio::time::timeout(PROBE_TIMEOUT, client.request(req)).await {
        Ok(Ok(response)) => Ok(response.status().as_u16()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("timeout".to_string()),
    }
}

/// 组内任一上游返回 200 即视为可用
pub async fn check_group(client: &HttpClient, group: &UpstreamGroup) -> ServiceHealth {
    if group.is_empty() {
        return ServiceHealth {
            up: false,
            status: None,
            error: Some("no_upstream".to_string()),
        };
    }

    let mut last = ServiceHealth {
        up: false,
        status: None,
        error: None,
    };
    for upstream in group.upstreams() {
        match probe(client, &upstream.base).await {
            Ok(200) => {
                return ServiceHealth {
                    up: true,
                    status: Some(200),
                    error: None,
                }
            }
            Ok(status) => {
                last = ServiceHealth {
                    up: false,
                    status: Some(status),
                    error: None,
                }
            }
            Err(e) => {
                tracing::debug!(service = %group.name, upstream = %upstream.base, error = %e, "Health probe failed");
                last = ServiceHealth {
                    up: false,
                    status: None,
                    error: Some(e),
                }
            }
        }
    }
    last
}
