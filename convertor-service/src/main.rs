use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

mod api;
mod config;
mod engines;
mod error;
mod imaging;
mod pages;
mod service;
mod staging;
mod text;

use crate::error::StartupError;
use crate::service::ConvertorService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting convertor service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = crate::config::load_config()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        scratch_dir = %config.storage.scratch_dir.display(),
        "Configuration loaded"
    );

    // Prometheus recorder backs the counters emitted per transform
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| StartupError::Metrics {
            message: e.to_string(),
        })?;

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Prepares scratch space and loads the matting model once
    let service = Arc::new(ConvertorService::new(config).await?);

    let app = api::router(service, Some(metrics));

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("convertor_service=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Shutdown signal received");
}
