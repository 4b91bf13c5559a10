//! Logging initialization.

use tracing::Subscriber;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LogOutput, LoggingConfig};
use crate::error::ExporterError;

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set. Supports
/// two output formats:
/// - `LogFormat::Logfmt` (default): one plain line per event, the timestamp
///   and level followed by the message and its `key=value` fields
/// - `LogFormat::Json`: structured JSON for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ExporterError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let writer = match config.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
    };

    build_subscriber(config.format, filter, writer)
        .try_init()
        .map_err(|e| ExporterError::Logging(e.to_string()))
}

fn build_subscriber(
    format: LogFormat,
    filter: EnvFilter,
    writer: BoxMakeWriter,
) -> Box<dyn Subscriber + Send + Sync> {
    match format {
        // No ANSI colors or module targets, so lines stay `key=value` parseable.
        LogFormat::Logfmt => Box::new(
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .compact()
                        .with_ansi(false)
                        .with_target(false)
                        .with_writer(writer),
                )
                .with(filter),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(writer))
                .with(filter),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(format: LogFormat) -> String {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = build_subscriber(
            format,
            EnvFilter::new("info"),
            BoxMakeWriter::new(move || sink.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(collector = "nodes", duration_ms = 12, "Scrape finished");
            tracing::debug!("filtered out");
        });

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_text_format_is_key_value() {
        let output = capture(LogFormat::Logfmt);
        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("INFO"));
        assert!(output.contains("Scrape finished"));
        assert!(output.contains("collector=\"nodes\""));
        assert!(output.contains("duration_ms=12"));
        assert!(!output.contains("elasticsearch_exporter::logging"));
        assert!(!output.contains('\x1b'));
    }

    #[test]
    fn test_json_format() {
        let output = capture(LogFormat::Json);
        let line: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["fields"]["message"], "Scrape finished");
        assert_eq!(line["fields"]["collector"], "nodes");
    }
}
