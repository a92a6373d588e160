use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use hexturf::{
    config::ServerConfig,
    http::{self, AppState},
    ledger::TerritoryLedger,
    relay::RelayHub,
    store::MemoryStore,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init(telemetry::LogFormat::from_env())?;
    let config = ServerConfig::from_env();

    let store = Arc::new(
        MemoryStore::open(config.data_path.clone())
            .await
            .context("opening territory store")?,
    );
    let state = AppState {
        ledger: TerritoryLedger::new(store.clone()),
        regions: store.clone(),
        relay: RelayHub::new(config.relay_capacity),
    };
    let app = http::router(state, &config.static_dir);

    let addr = config.addr;
    tracing::info!(%addr, "listening");
    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().context("closing territory store")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
