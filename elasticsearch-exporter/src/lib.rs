//! Prometheus exporter for Elasticsearch.
//!
//! Every scrape of the metrics endpoint triggers a live round of polling
//! against the Elasticsearch cluster. Results of all active collectors are
//! merged into a single text exposition document.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ ExporterConf │──>│ TLS + client │──>│  Collector   │──>│ HTTP server  │
//! │ (flags, env) │   │  (reqwest)   │   │   registry   │   │  (/metrics)  │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//!                                              ▲                  │
//!                                              └── per-scrape ────┘
//!                                                  fan-out
//! ```
//!
//! # Usage
//!
//! ```bash
//! elasticsearch-exporter --es.uri http://localhost:9200 --es.indices
//! ```
//!
//! # Configuration
//!
//! See [`args::Args`] for the command-line flags and [`config::ExporterConfig`]
//! for the resolved configuration.

pub mod args;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod exposition;
pub mod http;
pub mod logging;
pub mod registry;
pub mod scrape;
pub mod tls;

use std::sync::Arc;

pub use args::Args;
pub use client::EsClient;
pub use collector::{Collector, CollectorKind};
pub use config::{ExporterConfig, NodeSelection};
pub use error::{CollectError, ExporterError};
pub use http::HttpServer;
pub use registry::CollectorRegistry;
pub use scrape::ScrapeCoordinator;
pub use tls::TransportContext;

/// Name reported in logs and in the build info metric.
pub const EXPORTER_NAME: &str = "elasticsearch_exporter";

/// Build every startup artifact from a resolved configuration.
///
/// Loads TLS material, constructs the shared client and the collector
/// registry. Any failure here is fatal: no listener is created.
pub fn build_server(config: &ExporterConfig) -> Result<HttpServer, ExporterError> {
    let transport = TransportContext::build(&config.tls)?;
    tracing::info!(mode = transport.mode(), "Prepared upstream transport");

    let client = EsClient::new(config.es_url.clone(), config.timeout, transport)
        .map_err(ExporterError::Client)?;
    let registry = CollectorRegistry::from_config(config, &client);
    let coordinator = Arc::new(ScrapeCoordinator::new(registry));

    Ok(HttpServer::new(
        coordinator,
        config.listen,
        config.metrics_path.clone(),
    ))
}
