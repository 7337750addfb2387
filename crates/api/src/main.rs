use std::sync::Arc;

use anyhow::Context;

use walletd_api::app;
use walletd_auth::Hs256Authenticator;
use walletd_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    walletd_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "starting walletd");

    let services = Arc::new(app::build_services(&config).await?);
    let authenticator = Arc::new(Hs256Authenticator::new(config.jwt_secret.as_bytes()));
    let router = app::build_app(services, authenticator);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router).await?;
    Ok(())
}
