use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing::{info, warn};

use lanstream::{
    cli::{Cli, ServerConfig},
    history::History,
    hub::ConnectionHub,
    net,
    routes::build_router,
    state::AppState,
    telemetry::Telemetry,
    uploads::UploadDir,
};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = Telemetry::init()?;

    let cli = Cli::parse();
    let config = ServerConfig::try_from(cli)?;
    info!(
        listen_addr = %config.listen_addr,
        upload_directory = %config.upload_directory.display(),
        history_file = %config.history_file.display(),
        "starting lanstream"
    );

    run(config, telemetry.metrics_handle()).await
}

async fn run(config: ServerConfig, metrics: PrometheusHandle) -> Result<()> {
    let history = History::open(&config.history_file, config.recent_capacity);
    let uploads = UploadDir::new(&config.upload_directory);
    uploads
        .ensure()
        .await
        .context("failed to create upload directory")?;

    let (hub, hub_task) = ConnectionHub::spawn();
    let state = Arc::new(
        AppState::new(history, hub.clone(), uploads)
            .with_connection_buffer(config.connection_buffer)
            .with_max_upload_bytes(config.max_upload_bytes)
            .with_metrics(metrics),
    );
    let router = build_router(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;
    let bound = listener.local_addr().context("listener has no local address")?;
    for url in net::access_urls(bound, net::primary_lan_address()) {
        info!("open {url} in a browser");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;

    // Upgraded websockets outlive `serve`; close them and give the writer
    // tasks the grace period to flush their close frames.
    if let Err(err) = hub.close_all() {
        warn!(error = %err, "could not close websocket connections");
    }
    info!(
        grace_seconds = config.shutdown_grace.as_secs(),
        "shutdown signal received; draining websocket connections"
    );
    tokio::time::sleep(config.shutdown_grace).await;
    hub_task.abort();
    info!("graceful shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
