//! Error types for the exporter.

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::tls::TlsError;

/// Fatal errors raised while building the exporter. None of these are
/// recoverable; the process exits before a listener is created.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

/// Errors raised by a single collector during a scrape.
///
/// These never escape the scrape: the coordinator logs them and reports the
/// collector as down.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}
