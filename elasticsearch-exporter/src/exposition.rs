//! Prometheus text exposition format.
//!
//! Collectors produce [`MetricFamily`] values; [`render`] merges families of
//! the same name and writes them out in a stable order: families sorted by
//! name, samples sorted by label set.

use std::collections::BTreeMap;
use std::fmt::Write;

use thiserror::Error;
use tracing::debug;

/// Content type of the rendered document.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Rendering errors. These indicate a bug in a collector's static metric
/// definitions, never an upstream failure.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Metric family {name} declared as both {first} and {second}")]
    ConflictingTypes {
        name: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("Failed to write exposition output: {0}")]
    Write(#[from] std::fmt::Error),
}

/// Prometheus metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Static description of a metric a collector can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub help: &'static str,
    pub metric_type: MetricType,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, help: &'static str, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            help,
            metric_type,
        }
    }

    pub fn gauge(name: impl Into<String>, help: &'static str) -> Self {
        Self::new(name, help, MetricType::Gauge)
    }

    pub fn counter(name: impl Into<String>, help: &'static str) -> Self {
        Self::new(name, help, MetricType::Counter)
    }

    /// An empty family for this descriptor.
    pub fn family(&self) -> MetricFamily {
        MetricFamily {
            name: self.name.clone(),
            help: self.help,
            metric_type: self.metric_type,
            samples: Vec::new(),
        }
    }
}

/// One sample: a sorted label set and a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

/// All samples of one metric name.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: &'static str,
    pub metric_type: MetricType,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    /// Add a sample. Labels are sorted so equal label sets compare equal.
    pub fn push<K, V, I>(&mut self, labels: I, value: f64)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels: Vec<(String, String)> = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        labels.sort_by(|a, b| a.0.cmp(&b.0));
        self.samples.push(Sample { labels, value });
    }

    /// Builder-style variant of [`Self::push`].
    #[must_use]
    pub fn with_sample<K, V, I>(mut self, labels: I, value: f64) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.push(labels, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Merge families and render them as one exposition document.
///
/// Families sharing a name are combined. Duplicate series (same name and
/// labels) keep their first value.
pub fn render(families: Vec<MetricFamily>) -> Result<String, RenderError> {
    let mut merged: BTreeMap<String, MetricFamily> = BTreeMap::new();

    for family in families {
        match merged.get_mut(&family.name) {
            Some(existing) => {
                if existing.metric_type != family.metric_type {
                    return Err(RenderError::ConflictingTypes {
                        name: family.name,
                        first: existing.metric_type.as_str(),
                        second: family.metric_type.as_str(),
                    });
                }
                existing.samples.extend(family.samples);
            }
            None => {
                merged.insert(family.name.clone(), family);
            }
        }
    }

    let mut output = String::with_capacity(merged.len() * 128);
    for family in merged.values_mut() {
        if family.samples.is_empty() {
            continue;
        }

        // Stable sort keeps the first of any duplicate series in front.
        family.samples.sort_by(|a, b| a.labels.cmp(&b.labels));
        let before = family.samples.len();
        family.samples.dedup_by(|later, earlier| later.labels == earlier.labels);
        if family.samples.len() != before {
            debug!(
                metric = %family.name,
                dropped = before - family.samples.len(),
                "Dropped duplicate series"
            );
        }

        writeln!(output, "# HELP {} {}", family.name, escape_help(family.help))?;
        writeln!(output, "# TYPE {} {}", family.name, family.metric_type.as_str())?;
        for sample in &family.samples {
            writeln!(
                output,
                "{}{} {}",
                family.name,
                format_labels(&sample.labels),
                format_value(sample.value)
            )?;
        }
    }

    Ok(output)
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape special characters in help text.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_LABELS: [(&str, &str); 0] = [];

    #[test]
    fn test_render_single_family() {
        let family = Descriptor::gauge("es_test", "A test gauge.")
            .family()
            .with_sample([("cluster", "prod")], 3.0);

        let output = render(vec![family]).unwrap();
        assert_eq!(
            output,
            "# HELP es_test A test gauge.\n\
             # TYPE es_test gauge\n\
             es_test{cluster=\"prod\"} 3\n"
        );
    }

    #[test]
    fn test_render_sorts_families_and_samples() {
        let b = Descriptor::gauge("b_metric", "B.")
            .family()
            .with_sample([("node", "z")], 1.0)
            .with_sample([("node", "a")], 2.0);
        let a = Descriptor::counter("a_metric", "A.")
            .family()
            .with_sample(NO_LABELS, 5.0);

        let output = render(vec![b, a]).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "# HELP a_metric A.");
        assert_eq!(lines[1], "# TYPE a_metric counter");
        assert_eq!(lines[2], "a_metric 5");
        assert_eq!(lines[5], "b_metric{node=\"a\"} 2");
        assert_eq!(lines[6], "b_metric{node=\"z\"} 1");
    }

    #[test]
    fn test_render_is_order_independent() {
        let make = |name: &str, node: &str, value: f64| {
            Descriptor::gauge(name.to_string(), "Help.")
                .family()
                .with_sample([("node", node)], value)
        };
        let forward = vec![make("m1", "a", 1.0), make("m2", "b", 2.0), make("m1", "c", 3.0)];
        let mut backward = forward.clone();
        backward.reverse();

        assert_eq!(render(forward).unwrap(), render(backward).unwrap());
    }

    #[test]
    fn test_render_merges_same_name() {
        let first = Descriptor::gauge("up", "Up.")
            .family()
            .with_sample([("collector", "a")], 1.0);
        let second = Descriptor::gauge("up", "Up.")
            .family()
            .with_sample([("collector", "b")], 0.0);

        let output = render(vec![first, second]).unwrap();
        assert_eq!(output.matches("# TYPE up gauge").count(), 1);
        assert!(output.contains("up{collector=\"a\"} 1"));
        assert!(output.contains("up{collector=\"b\"} 0"));
    }

    #[test]
    fn test_render_conflicting_types() {
        let gauge = Descriptor::gauge("x", "X.").family().with_sample(NO_LABELS, 1.0);
        let counter = Descriptor::counter("x", "X.").family().with_sample(NO_LABELS, 1.0);

        let err = render(vec![gauge, counter]).unwrap_err();
        assert!(matches!(err, RenderError::ConflictingTypes { .. }));
    }

    #[test]
    fn test_render_drops_duplicate_series() {
        let family = Descriptor::gauge("dup", "Dup.")
            .family()
            .with_sample([("node", "a")], 1.0)
            .with_sample([("node", "a")], 2.0);

        let output = render(vec![family]).unwrap();
        assert_eq!(output.matches("dup{node=\"a\"}").count(), 1);
        assert!(output.contains("dup{node=\"a\"} 1"));
    }

    #[test]
    fn test_render_skips_empty_families() {
        let empty = Descriptor::gauge("empty", "Empty.").family();
        assert_eq!(render(vec![empty]).unwrap(), "");
    }

    #[test]
    fn test_labels_sorted_on_push() {
        let family = Descriptor::gauge("m", "M.")
            .family()
            .with_sample([("z", "1"), ("a", "2")], 1.0);
        assert_eq!(family.samples[0].labels[0].0, "a");
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(2.5), "2.5");
        assert_eq!(format_value(-7.0), "-7");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }
}
