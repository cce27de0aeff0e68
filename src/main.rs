//! 认证服务主入口

use sisfo_auth::{
    config::AppConfig,
    db,
    handlers::health,
    middleware::AppState,
    rabbitmq::{EventPublisher, StudentRegistrationConsumer},
    routes,
    store::RedisStore,
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if let Some(arg) = args.get(1) {
        match arg.as_str() {
            "--version" => {
                println!("sisfo-auth {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("未知参数: {}", other);
                print_help();
                std::process::exit(1);
            }
        }
    }

    dotenv::dotenv().ok();
    health::set_start_time();

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;
    config.require_persistence()?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.server.service_name, &config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), env = %config.server.env, "sisfo-auth starting");

    // 3. 数据库连接池 + 迁移
    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;
    tracing::info!("Database initialized");

    // 4. Redis 与消息队列
    let store = Arc::new(RedisStore::connect(&config.redis.url()).await?);
    let events = Arc::new(EventPublisher::new(&config.rabbitmq));

    // 5. 构建应用状态
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(config.clone(), db_pool, store, events)?);

    // 6. 后台任务：审计保留清理、学生注册消费
    state
        .audit_service
        .spawn_retention_job(config.security.audit_retention_days);

    let consumer = StudentRegistrationConsumer::new(
        state.user_service.clone(),
        state.role_service.clone(),
        config.rabbitmq.student_default_password.clone(),
    );
    let consumer_config = config.rabbitmq.clone();
    tokio::spawn(async move {
        loop {
            if let Err(e) = consumer.run(&consumer_config).await {
                tracing::error!(error = %e, "Student registration consumer failed");
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    });

    // 7. 启动服务器
    let app = routes::create_router(state);
    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理；超过期限仍未完成则强制退出
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        std::process::exit(1);
    });
}

fn print_help() {
    println!("sisfo-auth {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: sisfo-auth [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 APP_ 前缀的环境变量完成，参考 .env.example");
}
