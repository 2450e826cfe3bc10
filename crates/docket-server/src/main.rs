//! `docket-server`: the task broker over HTTP.
//!
//! Usage:
//!   docket-server [--listen <addr>] [--database-url <url>]
//!
//! Without a database URL the broker runs on the in-memory store.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use docket_core::Broker;
use docket_core::impls::MemoryTaskStore;
use docket_core::ports::TaskStore;
use docket_pg::PgTaskStore;
use docket_server::observability::init_logging;
use docket_server::{AppState, ServerConfig, build_router};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(config.log_format);
    config.validate()?;

    let store: Arc<dyn TaskStore> = match &config.database_url {
        Some(url) => {
            let store = PgTaskStore::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            store.migrate().await.context("failed to run migrations")?;
            info!(max_connections = config.db_max_connections, "using PostgreSQL store");
            Arc::new(store)
        }
        None => {
            warn!("no DATABASE_URL; using the in-memory store (state is lost on exit)");
            Arc::new(MemoryTaskStore::new())
        }
    };

    let broker = Broker::builder()
        .shared_store(store)
        .config(config.broker_config())
        .build()?;
    let app = build_router(AppState::new(broker), config.request_timeout());

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(listen = %config.listen, "docket-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("docket-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
