use anyhow::Context;
use currency_explorer::api::create_router;
use currency_explorer::config::AppConfig;
use currency_explorer::observability::{metrics, tracing::init_tracing};
use currency_explorer::AppContext;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load_from_env().context("failed to load configuration")?;
    init_tracing(config.debug, config.json_logs);
    metrics::register_metrics()?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let ctx = AppContext::build(config).await?;
    ctx.start().await?;

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Currency explorer listening on {}", addr);

    let served = axum::serve(listener, create_router(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    ctx.shutdown().await;
    served.context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
