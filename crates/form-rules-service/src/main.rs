//! 表单规则服务
//!
//! 提供规则保存、模板注册与服务端规则评估的 REST API。

use anyhow::Context;
use axum::http::HeaderValue;
use form_rules_service::{routes, seed, state::AppState};
use forms_shared::{config::AppConfig, observability};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "form-rules-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME).context("加载配置失败")?;
    let _guard = observability::init(&config.observability).await?;

    info!(
        environment = %config.environment,
        max_depth = config.engine.max_depth,
        max_rules = config.engine.max_rules,
        "Starting {} on {}",
        SERVICE_NAME,
        config.server_addr()
    );

    let state = AppState::from_config(&config.engine);
    seed::load(&config.seed, &state)?;

    let app = routes::app(state).layer(cors_layer(&config));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// CORS：FORMS_CORS_ORIGINS 为逗号分隔的来源列表，"*" 表示放开全部
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let allowed_origins = std::env::var("FORMS_CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());

    if allowed_origins == "*" {
        if config.is_production() {
            warn!("FORMS_CORS_ORIGINS=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    info!("CORS allowed_origins: {}", allowed_origins);
    let origins: Vec<_> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 监听关闭信号
///
/// 收到 SIGTERM 或 Ctrl+C 后返回，触发 axum 的优雅关闭流程。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("注册 Ctrl+C 处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("注册 SIGTERM 处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
