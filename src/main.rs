//! Parking console - plate-recognition session tracker
//!
//! Headless service: serves the operator HTTP API, runs scans against the
//! recognition engine and reports metrics. The terminal console lives in
//! `bin/tui.rs`.
//!
//! Module structure:
//! - `domain/` - Core types (PlateId, sessions, history records, billing)
//! - `io/` - External interfaces (OCR engine, frame capture, HTTP API)
//! - `services/` - Business logic (plate policy, registry, ledger, rate, scanner)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use parking_console::infra::{Config, Metrics};
use parking_console::io::{start_api_server, ApiContext, HttpOcrEngine};
use parking_console::services::{ParkingState, ScanPipeline};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Parking console - plate-recognition session tracker
#[derive(Parser, Debug)]
#[command(name = "parking-console", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-recognition detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("parking-console starting");

    let args = Args::parse();
    let config = Config::load(args.config.as_deref());

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        hourly_rate = %config.hourly_rate(),
        seed_demo_data = %config.seed_demo_data(),
        api_port = %config.api_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut state = ParkingState::new(config.hourly_rate());
    if config.seed_demo_data() {
        state.seed_demo_data(chrono::Utc::now());
    }
    let metrics = Arc::new(Metrics::new());
    let recognizer = Arc::new(HttpOcrEngine::new(config.ocr_url())?);
    info!(url = %recognizer.url(), language = %config.ocr_language(), "ocr_engine_ready");
    let pipeline = Arc::new(ScanPipeline::new(
        recognizer,
        Arc::new(parking_lot::Mutex::new(state)),
        metrics.clone(),
        config.ocr_language(),
    ));

    // Start operator API (if port > 0)
    let api_handle = if config.api_port() > 0 {
        let ctx = Arc::new(ApiContext {
            pipeline: pipeline.clone(),
            site_id: config.site_id().to_string(),
            currency: config.currency().to_string(),
        });
        let bind_address = config.api_bind_address().to_string();
        let port = config.api_port();
        let api_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = start_api_server(&bind_address, port, ctx, api_shutdown).await {
                tracing::error!(error = %e, "api_server_error");
            }
        }))
    } else {
        None
    };

    // Start metrics reporter
    let report_pipeline = pipeline.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let (active, history) = {
                let state = report_pipeline.state().lock();
                (state.registry().len(), state.ledger().len())
            };
            report_pipeline.metrics().report(active, history).log();
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = api_handle {
        let _ = handle.await;
    }

    info!("parking-console shutdown complete");
    Ok(())
}
