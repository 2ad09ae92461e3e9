use anyhow::Context;

use stockbook_api::app::build_app;
use stockbook_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load().context("failed to load configuration")?;
    stockbook_observability::init(&config.log);

    let app = build_app(&config).await.context("failed to build application")?;

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app.router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    tokio::task::spawn_blocking(move || app.projection.shutdown()).await?;
    tracing::info!("shut down");
    Ok(())
}
