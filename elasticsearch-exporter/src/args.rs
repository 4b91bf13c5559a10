//! Command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{LogFormat, LogLevel, LogOutput, LoggingConfig};

/// Prometheus exporter for Elasticsearch.
#[derive(Parser, Debug, Clone)]
#[command(name = "elasticsearch-exporter")]
#[command(about = "Export Elasticsearch cluster statistics as Prometheus metrics")]
#[command(version)]
pub struct Args {
    /// Address to listen on for web interface and telemetry.
    #[arg(long = "web.listen-address", default_value = ":9113")]
    pub listen_address: String,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", default_value = "/metrics")]
    pub telemetry_path: String,

    /// HTTP API address of an Elasticsearch node. Overridden by `ES_URI`.
    #[arg(long = "es.uri", default_value = "http://localhost:9200")]
    pub es_uri: String,

    /// Timeout for trying to get stats from Elasticsearch (e.g. 5s, 500ms).
    #[arg(long = "es.timeout", default_value = "5s", value_parser = parse_duration)]
    pub es_timeout: Duration,

    /// Export stats for all nodes in the cluster. Overrides `es.node`.
    #[arg(long = "es.all")]
    pub es_all: bool,

    /// Name of the node whose metrics should be exposed.
    #[arg(long = "es.node", default_value = "_local")]
    pub es_node: String,

    /// Export stats for indices in the cluster.
    #[arg(long = "es.indices")]
    pub es_indices: bool,

    /// Export stats for cluster settings.
    #[arg(long = "es.cluster_settings")]
    pub es_cluster_settings: bool,

    /// Export stats for shards in the cluster (implies `es.indices`).
    #[arg(long = "es.shards")]
    pub es_shards: bool,

    /// Export stats for the cluster snapshots.
    #[arg(long = "es.snapshots")]
    pub es_snapshots: bool,

    /// Path to PEM file that contains trusted Certificate Authorities.
    #[arg(long = "es.ca")]
    pub es_ca: Option<PathBuf>,

    /// Path to PEM file that contains the client certificate.
    #[arg(long = "es.client-cert")]
    pub es_client_cert: Option<PathBuf>,

    /// Path to PEM file that contains the private key for client auth.
    #[arg(long = "es.client-private-key")]
    pub es_client_private_key: Option<PathBuf>,

    /// Skip SSL verification when connecting to Elasticsearch.
    #[arg(long = "es.ssl-skip-verify")]
    pub es_ssl_skip_verify: bool,

    /// Log level.
    #[arg(long = "log.level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format.
    #[arg(long = "log.format", value_enum, default_value_t = LogFormat::Logfmt)]
    pub log_format: LogFormat,

    /// Log output.
    #[arg(long = "log.output", value_enum, default_value_t = LogOutput::Stdout)]
    pub log_output: LogOutput,
}

impl Args {
    /// Logging settings, needed before the rest of the configuration is resolved.
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level,
            format: self.log_format,
            output: self.log_output,
        }
    }
}

/// Parse a duration such as `5s`, `500ms`, `2m` or `1h`. A bare number is
/// read as seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);

    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{value}'"))?;
    let seconds = match unit {
        "" | "s" => number,
        "ms" => number / 1_000.0,
        "m" => number * 60.0,
        "h" => number * 3_600.0,
        other => return Err(format!("unknown duration unit '{other}' in '{value}'")),
    };

    if seconds <= 0.0 || !seconds.is_finite() {
        return Err(format!("duration must be positive, got '{value}'"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["elasticsearch-exporter"]).unwrap();

        assert_eq!(args.listen_address, ":9113");
        assert_eq!(args.telemetry_path, "/metrics");
        assert_eq!(args.es_uri, "http://localhost:9200");
        assert_eq!(args.es_timeout, Duration::from_secs(5));
        assert_eq!(args.es_node, "_local");
        assert!(!args.es_all);
        assert!(!args.es_indices);
        assert!(!args.es_shards);
        assert!(args.es_ca.is_none());
        assert_eq!(args.log_level, LogLevel::Info);
        assert_eq!(args.log_format, LogFormat::Logfmt);
        assert_eq!(args.log_output, LogOutput::Stdout);
    }

    #[test]
    fn test_dotted_flags() {
        let args = Args::try_parse_from([
            "elasticsearch-exporter",
            "--es.uri",
            "https://es:9200",
            "--es.timeout",
            "250ms",
            "--es.shards",
            "--es.ca",
            "/etc/ca.pem",
            "--log.format",
            "json",
            "--log.output",
            "stderr",
        ])
        .unwrap();

        assert_eq!(args.es_uri, "https://es:9200");
        assert_eq!(args.es_timeout, Duration::from_millis(250));
        assert!(args.es_shards);
        assert_eq!(args.es_ca, Some(PathBuf::from("/etc/ca.pem")));
        assert_eq!(args.log_format, LogFormat::Json);
        assert_eq!(args.log_output, LogOutput::Stderr);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let result = Args::try_parse_from(["elasticsearch-exporter", "--log.level", "verbose"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        let result = Args::try_parse_from([
            "elasticsearch-exporter",
            "--es.timeout",
            "99999999999999999999h",
        ]);
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_version_flag() {
        let err = Args::try_parse_from(["elasticsearch-exporter", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("10"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1500ms"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("5 parsecs").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("99999999999999999999h").is_err());
    }
}
