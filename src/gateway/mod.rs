//! API 网关
//!
//! 按路径前缀把请求路由到上游服务组，组内轮询，每个上游带熔断器；
//! 受保护的前缀在转发前校验访问令牌

pub mod breaker;
pub mod health;
pub mod proxy;
pub mod routes;
pub mod upstream;

use axum::{
    extract::{Request, State},
    middleware::{from_fn, from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use config::{Config, ConfigError, Environment};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

use crate::{
    auth::{authenticate, TokenCodec},
    config::AppConfig,
    error::AppError,
    middleware::{
        client_ip, cors_middleware, panic_response, rate_limit_middleware, request_id_middleware,
        request_tracking_middleware, CorsPolicy, RateLimitPolicy, RateLimiter,
    },
    response::ApiResponse,
    store::SharedStore,
};

use self::{
    health::{check_group, GatewayHealth},
    proxy::{build_client, forward, HttpClient},
    routes::{RouteTable, SERVICES},
    upstream::UpstreamGroup,
};

/// 上游地址：`<svc>_urls`（逗号分隔，优先）或 `<svc>_url`
pub fn upstream_urls(source: &Config, service: &str) -> Vec<String> {
    let list = source
        .get_string(&format!("upstream_{service}_urls"))
        .ok()
        .filter(|s| !s.trim().is_empty());
    let single = || source.get_string(&format!("upstream_{service}_url")).ok();

    list.or_else(single)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// 从 APP_UPSTREAM_* 环境变量读取所有上游组
pub fn load_upstream_groups() -> Result<HashMap<String, Arc<UpstreamGroup>>, ConfigError> {
    let source = Config::builder()
        .add_source(Environment::with_prefix("APP").prefix_separator("_"))
        .build()?;

    Ok(groups_from(&source))
}

pub fn groups_from(source: &Config) -> HashMap<String, Arc<UpstreamGroup>> {
    SERVICES
        .iter()
        .map(|service| {
            let group = UpstreamGroup::from_urls(service, &upstream_urls(source, service));
            if group.is_empty() {
                tracing::warn!(service, "No upstream configured");
            } else {
                tracing::info!(service, upstreams = group.upstreams().len(), "Upstream group loaded");
            }
            (service.to_string(), Arc::new(group))
        })
        .collect()
}

pub struct GatewayState {
    pub routes: RouteTable,
    pub groups: HashMap<String, Arc<UpstreamGroup>>,
    pub client: HttpClient,
    pub tokens: Arc<TokenCodec>,
}

impl GatewayState {
    pub fn new(groups: HashMap<String, Arc<UpstreamGroup>>, tokens: Arc<TokenCodec>) -> Self {
        Self {
            routes: RouteTable::default(),
            groups,
            client: build_client(),
            tokens,
        }
    }
}

/// 受保护前缀要求有效的访问令牌；令牌原样转发给上游
pub async fn gateway_auth_middleware(
    State(state): State<Arc<GatewayState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(route) = state.routes.resolve(req.uri().path()) {
        if route.protected {
            authenticate(&state.tokens, req.headers())?;
        }
    }

    Ok(next.run(req).await)
}

pub async fn proxy_handler(
    State(state): State<Arc<GatewayState>>,
    req: Request,
) -> Result<Response, AppError> {
    let route = state
        .routes
        .resolve(req.uri().path())
        .ok_or(AppError::NoUpstream)?;

    let upstream = state
        .groups
        .get(route.service)
        .and_then(|group| group.pick())
        .ok_or(AppError::NoUpstream)?;

    let client = client_ip(&req);
    forward(&state.client, &upstream, req, &client).await
}

pub async fn gateway_health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let unconfigured = UpstreamGroup::from_urls("unconfigured", &[]);
    let client = &state.client;
    let probes = SERVICES.iter().map(|service| {
        let group = state
            .groups
            .get(*service)
            .map(|g| g.as_ref())
            .unwrap_or(&unconfigured);
        async move { (service.to_string(), check_group(client, group).await) }
    });

    let services = futures::future::join_all(probes).await.into_iter().collect();
    ApiResponse::ok(GatewayHealth { services })
}

/// 网关路由：健康检查 + 其余请求全部代理
pub fn create_gateway_router(state: Arc<GatewayState>, config: &AppConfig, store: SharedStore) -> Router {
    let rate_limiter = Arc::new(RateLimiter::new(
        store,
        RateLimitPolicy::from_config(&config.rate_limit),
    ));
    let cors = Arc::new(CorsPolicy::new(config.security.cors_allowed_origins.clone()));

    Router::new()
        .route("/api/v1/gateway/health", get(gateway_health))
        .fallback(proxy_handler)
        .layer(from_fn_with_state(state.clone(), gateway_auth_middleware))
        .layer(from_fn_with_state(cors, cors_middleware))
        .layer(from_fn_with_state(rate_limiter, rate_limit_middleware))
        .layer(from_fn(request_tracking_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(pairs: &[(&str, &str)]) -> Config {
        let mut builder = Config::builder();
        for (k, v) in pairs {
            builder = builder.set_override(*k, *v).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_upstream_urls_prefers_list() {
        let cfg = source(&[
            ("upstream_academic_urls", "http://a:1, http://b:2"),
            ("upstream_academic_url", "http://c:3"),
            ("upstream_finance_url", "http://f:4"),
        ]);

        assert_eq!(upstream_urls(&cfg, "academic"), vec!["http://a:1", "http://b:2"]);
        assert_eq!(upstream_urls(&cfg, "finance"), vec!["http://f:4"]);
        assert!(upstream_urls(&cfg, "file").is_empty());
    }

    #[test]
    fn test_groups_from_covers_every_service() {
        let cfg = source(&[("upstream_auth_url", "http://auth:8080")]);
        let groups = groups_from(&cfg);

        assert_eq!(groups.len(), SERVICES.len());
        assert!(!groups["auth"].is_empty());
        assert!(groups["academic"].is_empty());
    }
}
