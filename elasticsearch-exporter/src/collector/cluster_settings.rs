//! Cluster settings collector (`/_cluster/settings`).
//!
//! Settings can be reported nested (`{"cluster": {"routing": ...}}`) or flat
//! (`{"cluster.routing.allocation.enable": ...}`), and each value may come
//! from the persistent, transient or default section. The first section
//! that holds a setting wins, in that order.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{metric_name, non_empty};
use crate::client::EsClient;
use crate::error::CollectError;
use crate::exposition::{Descriptor, MetricFamily};

const SUBSYSTEM: &str = "clustersettings_stats";

const ALLOCATION_ENABLE: &str = "cluster.routing.allocation.enable";
const MAX_SHARDS_PER_NODE: &str = "cluster.max_shards_per_node";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ClusterSettingsResponse {
    persistent: Value,
    transient: Value,
    defaults: Value,
}

impl ClusterSettingsResponse {
    fn setting(&self, key: &str) -> Option<&Value> {
        [&self.persistent, &self.transient, &self.defaults]
            .into_iter()
            .find_map(|section| lookup(section, key))
    }
}

/// Find a dotted key in a settings object, accepting any mix of nested and
/// flat keys.
fn lookup<'a>(section: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(value) = section.get(key) {
        return Some(value);
    }
    key.match_indices('.').find_map(|(at, _)| {
        let child = section.get(&key[..at])?;
        lookup(child, &key[at + 1..])
    })
}

/// Numeric encoding of `cluster.routing.allocation.enable`.
fn allocation_value(setting: &str) -> Option<f64> {
    match setting {
        "all" => Some(0.0),
        "primaries" => Some(1.0),
        "new_primaries" => Some(2.0),
        "none" => Some(3.0),
        _ => None,
    }
}

/// Settings values are strings, but accept plain numbers too.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn allocation_descriptor() -> Descriptor {
    Descriptor::gauge(
        metric_name(SUBSYSTEM, "shard_allocation_enabled"),
        "Current mode of cluster wide shard routing allocation settings (0 all, 1 primaries, 2 new_primaries, 3 none).",
    )
}

fn max_shards_descriptor() -> Descriptor {
    Descriptor::gauge(
        metric_name(SUBSYSTEM, "max_shards_per_node"),
        "Current maximum number of shards per node setting.",
    )
}

/// Reports selected cluster-wide settings.
#[derive(Debug, Clone)]
pub struct ClusterSettingsCollector {
    client: EsClient,
}

impl ClusterSettingsCollector {
    pub fn new(client: EsClient) -> Self {
        Self { client }
    }

    pub fn describe(&self) -> Vec<Descriptor> {
        vec![allocation_descriptor(), max_shards_descriptor()]
    }

    pub async fn collect(&self) -> Result<Vec<MetricFamily>, CollectError> {
        let settings: ClusterSettingsResponse = self
            .client
            .get_json("/_cluster/settings", &[("include_defaults", "true")])
            .await?;
        Ok(families(&settings))
    }
}

pub(crate) fn families(settings: &ClusterSettingsResponse) -> Vec<MetricFamily> {
    let no_labels: [(&str, &str); 0] = [];

    let mut allocation = allocation_descriptor().family();
    // Elasticsearch allocates everything unless told otherwise.
    let mode = settings
        .setting(ALLOCATION_ENABLE)
        .and_then(Value::as_str)
        .unwrap_or("all");
    match allocation_value(mode) {
        Some(value) => allocation.push(no_labels, value),
        None => debug!(mode, "Unknown shard allocation mode"),
    }

    let mut max_shards = max_shards_descriptor().family();
    if let Some(value) = settings.setting(MAX_SHARDS_PER_NODE).and_then(numeric) {
        max_shards.push(no_labels, value);
    }

    non_empty(vec![allocation, max_shards])
}
