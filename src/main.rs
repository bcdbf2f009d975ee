use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audit_chain::api::{routes, AuditApi};
use audit_chain::audit::LogStore;
use audit_chain::auth::StaticKeyResolver;
use audit_chain::config::AppConfig;
use audit_chain::storage::open_backend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audit_chain=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting audit-chain");

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    let backend = open_backend(&config.storage).await?;
    let store = LogStore::open(backend, config.storage.write_timeout()).await?;
    let report = store.verify().await?;
    info!("Audit log opened: {}", report.summary());

    let resolver = StaticKeyResolver::from_config(&config.api_keys);
    if resolver.is_empty() {
        warn!("No API keys configured; every request will be rejected");
    } else {
        info!("{} API keys loaded", resolver.len());
    }

    let app = routes::router(AuditApi::new(store, Arc::new(resolver)));

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server_host, config.server_port))?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
