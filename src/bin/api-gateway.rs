//! API 网关入口

use sisfo_auth::{
    auth::TokenCodec,
    config::AppConfig,
    gateway::{create_gateway_router, load_upstream_groups, GatewayState},
    store::RedisStore,
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    telemetry::init_telemetry("api-gateway", &config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");

    let tokens = Arc::new(TokenCodec::from_config(&config.jwt)?);
    let store = Arc::new(RedisStore::connect(&config.redis.url()).await?);
    let groups = load_upstream_groups()?;

    let state = Arc::new(GatewayState::new(groups, tokens));
    let app = create_gateway_router(state, &config, store);

    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Gateway listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
        })
        .await?;

    Ok(())
}
