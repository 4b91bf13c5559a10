//! Cluster health collector (`/_cluster/health`).

use serde::Deserialize;

use super::{metric_name, non_empty};
use crate::client::EsClient;
use crate::error::CollectError;
use crate::exposition::{Descriptor, MetricFamily};

const SUBSYSTEM: &str = "cluster_health";
const COLORS: [&str; 3] = ["green", "yellow", "red"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ClusterHealthResponse {
    cluster_name: String,
    status: String,
    number_of_nodes: u64,
    number_of_data_nodes: u64,
    active_primary_shards: u64,
    active_shards: u64,
    relocating_shards: u64,
    initializing_shards: u64,
    unassigned_shards: u64,
    delayed_unassigned_shards: u64,
    number_of_pending_tasks: u64,
    number_of_in_flight_fetch: u64,
    task_max_waiting_in_queue_millis: u64,
    active_shards_percent_as_number: f64,
}

struct Gauge {
    name: &'static str,
    help: &'static str,
    value: fn(&ClusterHealthResponse) -> f64,
}

const GAUGES: &[Gauge] = &[
    Gauge {
        name: "active_primary_shards",
        help: "The number of primary shards in your cluster. This is an aggregate total across all indices.",
        value: |h| h.active_primary_shards as f64,
    },
    Gauge {
        name: "active_shards",
        help: "Aggregate total of all shards across all indices, which includes replica shards.",
        value: |h| h.active_shards as f64,
    },
    Gauge {
        name: "active_shards_percent_as_number",
        help: "Percentage of active shards in the cluster.",
        value: |h| h.active_shards_percent_as_number,
    },
    Gauge {
        name: "delayed_unassigned_shards",
        help: "Shards delayed to reduce reallocation overhead.",
        value: |h| h.delayed_unassigned_shards as f64,
    },
    Gauge {
        name: "initializing_shards",
        help: "Count of shards that are being freshly created.",
        value: |h| h.initializing_shards as f64,
    },
    Gauge {
        name: "number_of_data_nodes",
        help: "Number of data nodes in the cluster.",
        value: |h| h.number_of_data_nodes as f64,
    },
    Gauge {
        name: "number_of_in_flight_fetch",
        help: "The number of ongoing shard info requests.",
        value: |h| h.number_of_in_flight_fetch as f64,
    },
    Gauge {
        name: "task_max_waiting_in_queue_millis",
        help: "Tasks max time waiting in queue.",
        value: |h| h.task_max_waiting_in_queue_millis as f64,
    },
    Gauge {
        name: "number_of_nodes",
        help: "Number of nodes in the cluster.",
        value: |h| h.number_of_nodes as f64,
    },
    Gauge {
        name: "number_of_pending_tasks",
        help: "Cluster level changes which have not yet been executed.",
        value: |h| h.number_of_pending_tasks as f64,
    },
    Gauge {
        name: "relocating_shards",
        help: "The number of shards that are currently moving from one node to another node.",
        value: |h| h.relocating_shards as f64,
    },
    Gauge {
        name: "unassigned_shards",
        help: "The number of shards that exist in the cluster state, but cannot be found in the cluster itself.",
        value: |h| h.unassigned_shards as f64,
    },
];

fn status_descriptor() -> Descriptor {
    Descriptor::gauge(
        metric_name(SUBSYSTEM, "status"),
        "Whether all primary and replica shards are allocated.",
    )
}

/// Reports `/_cluster/health`.
#[derive(Debug, Clone)]
pub struct ClusterHealthCollector {
    client: EsClient,
}

impl ClusterHealthCollector {
    pub fn new(client: EsClient) -> Self {
        Self { client }
    }

    pub fn describe(&self) -> Vec<Descriptor> {
        GAUGES
            .iter()
            .map(|g| Descriptor::gauge(metric_name(SUBSYSTEM, g.name), g.help))
            .chain(std::iter::once(status_descriptor()))
            .collect()
    }

    pub async fn collect(&self) -> Result<Vec<MetricFamily>, CollectError> {
        let health: ClusterHealthResponse = self.client.get_json("/_cluster/health", &[]).await?;
        Ok(families(&health))
    }
}

pub(crate) fn families(health: &ClusterHealthResponse) -> Vec<MetricFamily> {
    let cluster = [("cluster", health.cluster_name.as_str())];

    let mut families: Vec<MetricFamily> = GAUGES
        .iter()
        .map(|g| {
            Descriptor::gauge(metric_name(SUBSYSTEM, g.name), g.help)
                .family()
                .with_sample(cluster, (g.value)(health))
        })
        .collect();

    let mut status = status_descriptor().family();
    for color in COLORS {
        let value = if health.status == color { 1.0 } else { 0.0 };
        status.push(
            [("cluster", health.cluster_name.as_str()), ("color", color)],
            value,
        );
    }
    families.push(status);

    non_empty(families)
}
