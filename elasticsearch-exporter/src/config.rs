//! Resolved exporter configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;
use url::Url;

use crate::args::Args;

/// Environment variable that overrides `--es.uri`.
pub const ES_URI_ENV: &str = "ES_URI";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse es.uri '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },
    #[error("es.uri '{0}' must be an http or https URL with a host")]
    UnsupportedUri(String),
    #[error("Invalid listen address: {0}")]
    InvalidListen(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Which nodes the node collector reports on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeSelection {
    /// Every node in the cluster.
    All,
    /// A single node, by name, id or special value such as `_local`.
    Named(String),
}

impl NodeSelection {
    /// Stats endpoint path for this selection.
    pub fn stats_path(&self) -> String {
        match self {
            NodeSelection::All => "/_nodes/stats".to_string(),
            NodeSelection::Named(node) => format!("/_nodes/{node}/stats"),
        }
    }
}

/// TLS material for the upstream connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM bundle of trusted certificate authorities.
    pub ca: Option<PathBuf>,
    /// PEM client certificate.
    pub client_cert: Option<PathBuf>,
    /// PEM client private key.
    pub client_key: Option<PathBuf>,
    /// Disable upstream certificate validation.
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// True when no TLS option was given at all.
    pub fn is_empty(&self) -> bool {
        self.ca.is_none()
            && self.client_cert.is_none()
            && self.client_key.is_none()
            && !self.insecure_skip_verify
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain single-line text with `key=value` fields, no colors or targets.
    #[default]
    Logfmt,
    /// Structured JSON, one object per line.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
}

/// Logging configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
}

/// Complete exporter configuration. Built once at startup and only shared
/// by reference afterwards.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Base URL of the Elasticsearch HTTP API.
    pub es_url: Url,
    /// Timeout applied to every upstream call.
    pub timeout: Duration,
    /// Node selection for the node collector.
    pub nodes: NodeSelection,
    /// Export per-index statistics.
    pub export_indices: bool,
    /// Export per-shard statistics.
    pub export_shards: bool,
    /// Export snapshot statistics.
    pub export_snapshots: bool,
    /// Export cluster settings.
    pub export_cluster_settings: bool,
    /// Upstream TLS material.
    pub tls: TlsConfig,
    /// Address the HTTP server binds to.
    pub listen: SocketAddr,
    /// Path of the exposition endpoint.
    pub metrics_path: String,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl ExporterConfig {
    /// Resolve configuration from flags and the process environment.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let es_uri_env = std::env::var(ES_URI_ENV).ok();
        Self::resolve(args, es_uri_env)
    }

    /// Resolve configuration from flags and an optional `ES_URI` value.
    pub fn resolve(args: Args, es_uri_env: Option<String>) -> Result<Self, ConfigError> {
        let logging = args.logging();
        let es_uri = es_uri_env.unwrap_or(args.es_uri);
        let es_url = parse_es_url(&es_uri)?;
        let listen = parse_listen_address(&args.listen_address)?;

        let nodes = if args.es_all {
            NodeSelection::All
        } else {
            NodeSelection::Named(args.es_node)
        };

        let config = Self {
            es_url,
            timeout: args.es_timeout,
            nodes,
            export_indices: args.es_indices,
            export_shards: args.es_shards,
            export_snapshots: args.es_snapshots,
            export_cluster_settings: args.es_cluster_settings,
            tls: TlsConfig {
                ca: args.es_ca,
                client_cert: args.es_client_cert,
                client_key: args.es_client_private_key,
                insecure_skip_verify: args.es_ssl_skip_verify,
            },
            listen,
            metrics_path: args.telemetry_path,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.metrics_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.metrics_path == "/" {
            return Err(ConfigError::Validation(
                "Metrics path must not be the landing page /".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "es.timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the indices collector runs. Shard export implies it.
    pub fn indices_enabled(&self) -> bool {
        self.export_indices || self.export_shards
    }

    /// Upstream URL with any password masked, for logging.
    pub fn redacted_es_url(&self) -> String {
        redact_url(&self.es_url)
    }
}

fn parse_es_url(uri: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(uri).map_err(|source| ConfigError::InvalidUri {
        uri: uri.to_string(),
        source,
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::UnsupportedUri(redact_url(&url)));
    }
    Ok(url)
}

/// Parse a listen address. An empty host (`:9113`) binds all interfaces.
pub fn parse_listen_address(value: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = if value.starts_with(':') {
        format!("0.0.0.0{value}")
    } else {
        value.to_string()
    };

    candidate
        .parse()
        .map_err(|_| ConfigError::InvalidListen(value.to_string()))
}

/// Mask the password component of a URL.
pub fn redact_url(url: &Url) -> String {
    if url.password().is_none() {
        return url.to_string();
    }
    let mut redacted = url.clone();
    // Only fails for URLs without a host, which never get here.
    let _ = redacted.set_password(Some("xxxxx"));
    redacted.to_string()
}
