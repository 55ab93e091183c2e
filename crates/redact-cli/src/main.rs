//! `redact` command-line binary.

mod args;
mod commands;
mod config;
mod detectors;

use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::Cli;
use config::CliConfig;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing();

    let metrics = match &cli.options.metrics_out {
        Some(_) => match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Failed to install metrics recorder");
                None
            }
        },
        None => None,
    };
    let metrics_out = cli.options.metrics_out.clone();

    let env = CliConfig::from_env();
    info!(?env, "Loaded configuration");

    // Ctrl-C stops the frame loop; the output is finalised with what was read
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, finishing current frame");
            let _ = cancel_tx.send(true);
        }
    });

    let outcome = tokio::task::spawn_blocking(move || commands::run(cli, env, cancel_rx)).await;

    if let (Some(handle), Some(path)) = (metrics, metrics_out) {
        write_metrics(&handle, &path);
    }

    match outcome {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Processing task panicked");
            ExitCode::FAILURE
        }
    }
}

/// Colored output for terminals, JSON when `LOG_FORMAT=json`. Logs go to
/// stderr so `--json` results on stdout stay parseable.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("redact_cli=info,redact_media=info,ort=warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn write_metrics(handle: &PrometheusHandle, path: &Path) {
    match std::fs::write(path, handle.render()) {
        Ok(()) => info!(path = %path.display(), "Metrics written"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to write metrics"),
    }
}
