use anyhow::Context;

use tenantbill_api::app;
use tenantbill_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();
    tenantbill_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;
    let services = app::services::build_services(&config).await?;
    let router = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router).await?;
    Ok(())
}
