//! Collector registry.
//!
//! Decides once, from configuration, which collectors are active. The set
//! and its order never change afterwards.

use tracing::info;

use crate::client::EsClient;
use crate::collector::{
    ClusterHealthCollector, ClusterSettingsCollector, Collector, CollectorKind,
    IndicesCollector, NodesCollector, SnapshotsCollector,
};
use crate::config::ExporterConfig;
use crate::exposition::Descriptor;

/// Ordered, fixed set of active collectors.
#[derive(Debug, Clone)]
pub struct CollectorRegistry {
    collectors: Vec<Collector>,
}

impl CollectorRegistry {
    /// Compose the collector set. Cluster health and node stats are always
    /// active; the rest follow the feature toggles.
    pub fn from_config(config: &ExporterConfig, client: &EsClient) -> Self {
        let mut collectors = vec![
            Collector::ClusterHealth(ClusterHealthCollector::new(client.clone())),
            Collector::Nodes(NodesCollector::new(client.clone(), config.nodes.clone())),
        ];

        if config.indices_enabled() {
            collectors.push(Collector::Indices(IndicesCollector::new(
                client.clone(),
                config.export_shards,
            )));
        }
        if config.export_snapshots {
            collectors.push(Collector::Snapshots(SnapshotsCollector::new(client.clone())));
        }
        if config.export_cluster_settings {
            collectors.push(Collector::ClusterSettings(ClusterSettingsCollector::new(
                client.clone(),
            )));
        }

        let registry = Self { collectors };
        let names: Vec<&str> = registry.kinds().iter().map(CollectorKind::as_str).collect();
        info!(collectors = ?names, "Collectors enabled");
        registry
    }

    /// Registry over an explicit collector list, kept in the given order.
    pub fn from_collectors(collectors: Vec<Collector>) -> Self {
        Self { collectors }
    }

    pub fn collectors(&self) -> &[Collector] {
        &self.collectors
    }

    /// Active collector kinds in registry order.
    pub fn kinds(&self) -> Vec<CollectorKind> {
        self.collectors.iter().map(Collector::kind).collect()
    }

    /// Every descriptor of every active collector, `up` indicators included.
    pub fn descriptors(&self) -> Vec<Descriptor> {
        self.collectors
            .iter()
            .flat_map(Collector::describe)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}
