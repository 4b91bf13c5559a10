//! Prometheus exporter for Elasticsearch.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use elasticsearch_exporter::logging::init_tracing;
use elasticsearch_exporter::{Args, EXPORTER_NAME, ExporterConfig, HttpServer, build_server};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(&args.logging()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let (config, server) = match prepare(args) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Failed to start {EXPORTER_NAME}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen,
        es_uri = %config.redacted_es_url(),
        "Starting {EXPORTER_NAME}"
    );

    tokio::select! {
        result = server.run() => {
            // Listener failures are logged without a failing exit status.
            match result {
                Ok(()) => info!("HTTP server stopped"),
                Err(e) => error!(error = %e, "HTTP server quit"),
            }
        }
        signal = shutdown_signal() => {
            info!(signal, "Received signal, shutting down");
        }
    }

    ExitCode::SUCCESS
}

fn prepare(args: Args) -> anyhow::Result<(ExporterConfig, HttpServer)> {
    let config = ExporterConfig::from_args(args).context("Invalid configuration")?;
    let server = build_server(&config).context("Failed to initialize exporter")?;
    Ok((config, server))
}

/// Resolves on SIGINT or SIGTERM with the signal name.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
