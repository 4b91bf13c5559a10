//! Index statistics collector (`/_all/_stats`).

use std::collections::BTreeMap;

use serde::Deserialize;

use super::{metric_name, non_empty};
use crate::client::EsClient;
use crate::error::CollectError;
use crate::exposition::{Descriptor, MetricFamily, MetricType};

const SUBSYSTEM: &str = "indices";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct IndicesStatsResponse {
    indices: BTreeMap<String, IndexStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IndexStats {
    primaries: IndexStatsDetail,
    total: IndexStatsDetail,
    /// Present only with `level=shards`: shard number to shard copies.
    shards: BTreeMap<String, Vec<ShardStats>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IndexStatsDetail {
    docs: Docs,
    store: Store,
    indexing: Indexing,
    search: Search,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Docs {
    count: f64,
    deleted: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Store {
    size_in_bytes: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Indexing {
    index_total: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Search {
    query_total: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShardStats {
    routing: ShardRouting,
    docs: Docs,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShardRouting {
    node: Option<String>,
    primary: bool,
}

struct IndexMetric {
    name: &'static str,
    help: &'static str,
    metric_type: MetricType,
    value: fn(&IndexStats) -> f64,
}

const INDEX_METRICS: &[IndexMetric] = &[
    IndexMetric {
        name: "docs_primary",
        help: "Count of documents with only primary shards",
        metric_type: MetricType::Gauge,
        value: |i| i.primaries.docs.count,
    },
    IndexMetric {
        name: "deleted_docs_primary",
        help: "Count of deleted documents with only primary shards",
        metric_type: MetricType::Gauge,
        value: |i| i.primaries.docs.deleted,
    },
    IndexMetric {
        name: "store_size_bytes_primary",
        help: "Current total size of stored index data in bytes with only primary shards on all nodes",
        metric_type: MetricType::Gauge,
        value: |i| i.primaries.store.size_in_bytes,
    },
    IndexMetric {
        name: "docs_total",
        help: "Total count of documents",
        metric_type: MetricType::Gauge,
        value: |i| i.total.docs.count,
    },
    IndexMetric {
        name: "store_size_bytes_total",
        help: "Current total size of stored index data in bytes with all shards on all nodes",
        metric_type: MetricType::Gauge,
        value: |i| i.total.store.size_in_bytes,
    },
    IndexMetric {
        name: "indexing_index_total",
        help: "Total index calls",
        metric_type: MetricType::Counter,
        value: |i| i.total.indexing.index_total,
    },
    IndexMetric {
        name: "search_query_total",
        help: "Total number of queries",
        metric_type: MetricType::Counter,
        value: |i| i.total.search.query_total,
    },
];

impl IndexMetric {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(metric_name(SUBSYSTEM, self.name), self.help, self.metric_type)
    }
}

fn shard_docs_descriptor() -> Descriptor {
    Descriptor::gauge(
        metric_name(SUBSYSTEM, "shards_docs"),
        "Count of documents on this shard",
    )
}

/// Reports per-index statistics, optionally down to shard level.
#[derive(Debug, Clone)]
pub struct IndicesCollector {
    client: EsClient,
    shards: bool,
}

impl IndicesCollector {
    pub fn new(client: EsClient, shards: bool) -> Self {
        Self { client, shards }
    }

    /// Whether shard-level detail is requested.
    pub fn shards(&self) -> bool {
        self.shards
    }

    pub fn describe(&self) -> Vec<Descriptor> {
        let mut descriptors: Vec<Descriptor> =
            INDEX_METRICS.iter().map(IndexMetric::descriptor).collect();
        if self.shards {
            descriptors.push(shard_docs_descriptor());
        }
        descriptors
    }

    pub async fn collect(&self) -> Result<Vec<MetricFamily>, CollectError> {
        let query: &[(&str, &str)] = if self.shards {
            &[("level", "shards")]
        } else {
            &[]
        };
        let stats: IndicesStatsResponse = self.client.get_json("/_all/_stats", query).await?;
        Ok(families(&stats, self.shards))
    }
}

pub(crate) fn families(stats: &IndicesStatsResponse, shards: bool) -> Vec<MetricFamily> {
    let mut families: Vec<MetricFamily> = INDEX_METRICS
        .iter()
        .map(|metric| {
            let mut family = metric.descriptor().family();
            for (index, index_stats) in &stats.indices {
                family.push([("index", index.as_str())], (metric.value)(index_stats));
            }
            family
        })
        .collect();

    if shards {
        let mut shard_docs = shard_docs_descriptor().family();
        for (index, index_stats) in &stats.indices {
            for (shard, copies) in &index_stats.shards {
                for copy in copies {
                    // Unassigned copies have no node and hold no documents.
                    let Some(node) = copy.routing.node.as_deref() else {
                        continue;
                    };
                    shard_docs.push(
                        [
                            ("index", index.as_str()),
                            ("shard", shard.as_str()),
                            ("node", node),
                            ("primary", if copy.routing.primary { "true" } else { "false" }),
                        ],
                        copy.docs.count,
                    );
                }
            }
        }
        families.push(shard_docs);
    }

    non_empty(families)
}
