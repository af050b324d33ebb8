//! estpii Server
//!
//! Serves Estonian PII analysis and anonymization over HTTP.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

use estpii_server::{create_router, AppState, ServiceConfig};

#[derive(Parser, Debug)]
#[command(name = "estpii-server")]
#[command(about = "Estonian PII analysis and anonymization API", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ESTPII_CONFIG", default_value = "config/presidio-estbert.yaml")]
    config: PathBuf,

    /// Listen address
    #[arg(short = 'l', long, env = "ESTPII_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port
    #[arg(short = 'P', long, env = "ESTPII_PORT", default_value = "5000")]
    port: u16,

    /// Maximum request body size in bytes
    #[arg(long, env = "ESTPII_MAX_BODY_BYTES", default_value = "1048576")]
    max_body_bytes: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    info!("Starting estpii server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::load(&cli.config)?;
    info!(path = %cli.config.display(), "Configuration loaded");
    info!("Languages: {:?}", config.analyzer.supported_languages);
    info!("Models: {}", config.model_summary());

    let metrics_handle = init_metrics()?;

    // Model load failures stop startup here
    info!("Loading recognizers...");
    let state = AppState::new(config, Some(metrics_handle)).await?;
    info!("Recognizers loaded");

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    let app = create_router(state, cli.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("estpii=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("estpii=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "estpii_requests_total",
        "Total number of requests by endpoint"
    );
    metrics::describe_counter!(
        "estpii_recognizer_failures_total",
        "Recognizer failures excluded from results"
    );
    metrics::describe_counter!(
        "estpii_entities_detected_total",
        "Entities returned by analysis, by type"
    );
    metrics::describe_histogram!(
        "estpii_analysis_latency_us",
        metrics::Unit::Microseconds,
        "Analysis latency in microseconds"
    );
    metrics::describe_counter!("estpii_errors_total", "Total number of errors by kind");

    info!("Metrics exporter initialized");
    Ok(handle)
}
