//! Elasticsearch collectors.
//!
//! Every collector exposes the same capability set:
//!
//! - `describe()`: the static set of metrics it can emit, no I/O.
//! - `collect()`: polls the cluster and returns metric families, or fails.
//!
//! Collectors keep no state between calls. All accumulation happens in
//! call-local values, so concurrent scrapes never share mutable data.
//!
//! The `up` indicator of each collector is not emitted here; the scrape
//! coordinator adds it from the outcome of `collect()`.

mod cluster_health;
mod cluster_settings;
mod indices;
mod nodes;
mod snapshots;

use std::fmt;

pub use cluster_health::ClusterHealthCollector;
pub use cluster_settings::ClusterSettingsCollector;
pub use indices::IndicesCollector;
pub use nodes::NodesCollector;
pub use snapshots::SnapshotsCollector;

use crate::error::CollectError;
use crate::exposition::{Descriptor, MetricFamily};

/// Common prefix of every metric name.
pub const NAMESPACE: &str = "elasticsearch";

/// Build a fully qualified metric name.
pub(crate) fn metric_name(subsystem: &str, name: &str) -> String {
    format!("{NAMESPACE}_{subsystem}_{name}")
}

/// Collector variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorKind {
    ClusterHealth,
    Nodes,
    Indices,
    Snapshots,
    ClusterSettings,
}

impl CollectorKind {
    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorKind::ClusterHealth => "cluster_health",
            CollectorKind::Nodes => "nodes",
            CollectorKind::Indices => "indices",
            CollectorKind::Snapshots => "snapshots",
            CollectorKind::ClusterSettings => "cluster_settings",
        }
    }

    /// Metric subsystem of the collector's `up` indicator.
    fn up_subsystem(&self) -> &'static str {
        match self {
            CollectorKind::ClusterHealth => "cluster_health",
            CollectorKind::Nodes => "node_stats",
            CollectorKind::Indices => "index_stats",
            CollectorKind::Snapshots => "snapshot_stats",
            CollectorKind::ClusterSettings => "clustersettings_stats",
        }
    }

    /// Descriptor of the `up` indicator.
    pub fn up_descriptor(&self) -> Descriptor {
        Descriptor::gauge(
            metric_name(self.up_subsystem(), "up"),
            "Whether the last scrape of this Elasticsearch endpoint was successful.",
        )
    }

    /// `up` indicator with the given outcome.
    pub fn up_family(&self, up: bool) -> MetricFamily {
        let no_labels: [(&str, &str); 0] = [];
        self.up_descriptor()
            .family()
            .with_sample(no_labels, if up { 1.0 } else { 0.0 })
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collector. Dispatch over the fixed variant set is static.
#[derive(Debug, Clone)]
pub enum Collector {
    ClusterHealth(ClusterHealthCollector),
    Nodes(NodesCollector),
    Indices(IndicesCollector),
    Snapshots(SnapshotsCollector),
    ClusterSettings(ClusterSettingsCollector),
}

impl Collector {
    pub fn kind(&self) -> CollectorKind {
        match self {
            Collector::ClusterHealth(_) => CollectorKind::ClusterHealth,
            Collector::Nodes(_) => CollectorKind::Nodes,
            Collector::Indices(_) => CollectorKind::Indices,
            Collector::Snapshots(_) => CollectorKind::Snapshots,
            Collector::ClusterSettings(_) => CollectorKind::ClusterSettings,
        }
    }

    /// Static metric descriptors, including the `up` indicator.
    pub fn describe(&self) -> Vec<Descriptor> {
        let mut descriptors = match self {
            Collector::ClusterHealth(c) => c.describe(),
            Collector::Nodes(c) => c.describe(),
            Collector::Indices(c) => c.describe(),
            Collector::Snapshots(c) => c.describe(),
            Collector::ClusterSettings(c) => c.describe(),
        };
        descriptors.push(self.kind().up_descriptor());
        descriptors
    }

    /// Poll the cluster. Bounded by the client timeout; never retried.
    pub async fn collect(&self) -> Result<Vec<MetricFamily>, CollectError> {
        match self {
            Collector::ClusterHealth(c) => c.collect().await,
            Collector::Nodes(c) => c.collect().await,
            Collector::Indices(c) => c.collect().await,
            Collector::Snapshots(c) => c.collect().await,
            Collector::ClusterSettings(c) => c.collect().await,
        }
    }
}

/// Keep only families that received samples.
pub(crate) fn non_empty(families: Vec<MetricFamily>) -> Vec<MetricFamily> {
    families.into_iter().filter(|f| !f.is_empty()).collect()
}
