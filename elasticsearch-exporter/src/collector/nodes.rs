//! Node statistics collector (`/_nodes/.../stats`).

use std::collections::BTreeMap;

use serde::Deserialize;

use super::{metric_name, non_empty};
use crate::client::EsClient;
use crate::config::NodeSelection;
use crate::error::CollectError;
use crate::exposition::{Descriptor, MetricFamily, MetricType};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct NodesStatsResponse {
    cluster_name: String,
    nodes: BTreeMap<String, NodeStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct NodeStats {
    name: String,
    host: String,
    roles: Option<Vec<String>>,
    attributes: BTreeMap<String, String>,
    jvm: JvmStats,
    process: ProcessStats,
    os: OsStats,
    indices: IndicesStats,
    fs: FsStats,
    transport: TransportStats,
    breakers: BTreeMap<String, BreakerStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JvmStats {
    mem: JvmMem,
    gc: JvmGc,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JvmMem {
    heap_used_in_bytes: Option<f64>,
    heap_committed_in_bytes: Option<f64>,
    heap_max_in_bytes: Option<f64>,
    non_heap_used_in_bytes: Option<f64>,
    non_heap_committed_in_bytes: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JvmGc {
    collectors: BTreeMap<String, GcCollector>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GcCollector {
    collection_count: Option<f64>,
    collection_time_in_millis: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProcessStats {
    open_file_descriptors: Option<f64>,
    max_file_descriptors: Option<f64>,
    cpu: ProcessCpu,
    mem: ProcessMem,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProcessCpu {
    percent: Option<f64>,
    total_in_millis: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProcessMem {
    resident_in_bytes: Option<f64>,
    total_virtual_in_bytes: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OsStats {
    cpu: OsCpu,
    mem: OsMem,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OsCpu {
    percent: Option<f64>,
    load_average: LoadAverage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoadAverage {
    #[serde(rename = "1m")]
    one: Option<f64>,
    #[serde(rename = "5m")]
    five: Option<f64>,
    #[serde(rename = "15m")]
    fifteen: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OsMem {
    free_in_bytes: Option<f64>,
    used_in_bytes: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IndicesStats {
    docs: Docs,
    store: Store,
    indexing: Indexing,
    search: Search,
    segments: Segments,
    fielddata: Fielddata,
    merges: Merges,
    refresh: Refresh,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Docs {
    count: Option<f64>,
    deleted: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Store {
    size_in_bytes: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Indexing {
    index_time_in_millis: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Search {
    query_time_in_millis: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Segments {
    count: Option<f64>,
    memory_in_bytes: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fielddata {
    memory_size_in_bytes: Option<f64>,
    evictions: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Merges {
    total: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Refresh {
    total: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FsStats {
    data: Vec<FsData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FsData {
    path: String,
    mount: String,
    total_in_bytes: Option<f64>,
    free_in_bytes: Option<f64>,
    available_in_bytes: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TransportStats {
    rx_size_in_bytes: Option<f64>,
    tx_size_in_bytes: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BreakerStats {
    estimated_size_in_bytes: Option<f64>,
    limit_size_in_bytes: Option<f64>,
    tripped: Option<f64>,
}

/// A per-node metric read straight from the node stats.
struct NodeMetric {
    subsystem: &'static str,
    name: &'static str,
    help: &'static str,
    metric_type: MetricType,
    labels: &'static [(&'static str, &'static str)],
    value: fn(&NodeStats) -> Option<f64>,
}

impl NodeMetric {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new(
            metric_name(self.subsystem, self.name),
            self.help,
            self.metric_type,
        )
    }
}

fn millis_to_seconds(millis: Option<f64>) -> Option<f64> {
    millis.map(|m| m / 1000.0)
}

const NODE_METRICS: &[NodeMetric] = &[
    NodeMetric {
        subsystem: "os",
        name: "load1",
        help: "Shortterm load average",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.os.cpu.load_average.one,
    },
    NodeMetric {
        subsystem: "os",
        name: "load5",
        help: "Midterm load average",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.os.cpu.load_average.five,
    },
    NodeMetric {
        subsystem: "os",
        name: "load15",
        help: "Longterm load average",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.os.cpu.load_average.fifteen,
    },
    NodeMetric {
        subsystem: "os",
        name: "cpu_percent",
        help: "Percent CPU used by OS",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.os.cpu.percent,
    },
    NodeMetric {
        subsystem: "os",
        name: "mem_free_bytes",
        help: "Amount of free physical memory in bytes",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.os.mem.free_in_bytes,
    },
    NodeMetric {
        subsystem: "os",
        name: "mem_used_bytes",
        help: "Amount of used physical memory in bytes",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.os.mem.used_in_bytes,
    },
    NodeMetric {
        subsystem: "jvm_memory",
        name: "used_bytes",
        help: "JVM memory currently used by area",
        metric_type: MetricType::Gauge,
        labels: &[("area", "heap")],
        value: |n| n.jvm.mem.heap_used_in_bytes,
    },
    NodeMetric {
        subsystem: "jvm_memory",
        name: "used_bytes",
        help: "JVM memory currently used by area",
        metric_type: MetricType::Gauge,
        labels: &[("area", "non-heap")],
        value: |n| n.jvm.mem.non_heap_used_in_bytes,
    },
    NodeMetric {
        subsystem: "jvm_memory",
        name: "committed_bytes",
        help: "JVM memory currently committed by area",
        metric_type: MetricType::Gauge,
        labels: &[("area", "heap")],
        value: |n| n.jvm.mem.heap_committed_in_bytes,
    },
    NodeMetric {
        subsystem: "jvm_memory",
        name: "committed_bytes",
        help: "JVM memory currently committed by area",
        metric_type: MetricType::Gauge,
        labels: &[("area", "non-heap")],
        value: |n| n.jvm.mem.non_heap_committed_in_bytes,
    },
    NodeMetric {
        subsystem: "jvm_memory",
        name: "max_bytes",
        help: "JVM memory max",
        metric_type: MetricType::Gauge,
        labels: &[("area", "heap")],
        value: |n| n.jvm.mem.heap_max_in_bytes,
    },
    NodeMetric {
        subsystem: "process",
        name: "cpu_percent",
        help: "Percent CPU used by process",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.process.cpu.percent,
    },
    NodeMetric {
        subsystem: "process",
        name: "cpu_seconds_total",
        help: "Process CPU time in seconds",
        metric_type: MetricType::Counter,
        labels: &[],
        value: |n| millis_to_seconds(n.process.cpu.total_in_millis),
    },
    NodeMetric {
        subsystem: "process",
        name: "mem_resident_size_bytes",
        help: "Resident memory in use by process in bytes",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.process.mem.resident_in_bytes,
    },
    NodeMetric {
        subsystem: "process",
        name: "mem_virtual_size_bytes",
        help: "Total virtual memory used in bytes",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.process.mem.total_virtual_in_bytes,
    },
    NodeMetric {
        subsystem: "process",
        name: "open_files_count",
        help: "Open file descriptors",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.process.open_file_descriptors,
    },
    NodeMetric {
        subsystem: "process",
        name: "max_files_descriptors",
        help: "Max file descriptors",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.process.max_file_descriptors,
    },
    NodeMetric {
        subsystem: "indices",
        name: "docs",
        help: "Count of documents on this node",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.indices.docs.count,
    },
    NodeMetric {
        subsystem: "indices",
        name: "docs_deleted",
        help: "Count of deleted documents on this node",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.indices.docs.deleted,
    },
    NodeMetric {
        subsystem: "indices",
        name: "store_size_bytes",
        help: "Current size of stored index data in bytes",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.indices.store.size_in_bytes,
    },
    NodeMetric {
        subsystem: "indices",
        name: "segments_count",
        help: "Count of index segments on this node",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.indices.segments.count,
    },
    NodeMetric {
        subsystem: "indices",
        name: "segments_memory_bytes",
        help: "Current memory size of segments in bytes",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.indices.segments.memory_in_bytes,
    },
    NodeMetric {
        subsystem: "indices",
        name: "fielddata_memory_size_bytes",
        help: "Field data cache memory usage in bytes",
        metric_type: MetricType::Gauge,
        labels: &[],
        value: |n| n.indices.fielddata.memory_size_in_bytes,
    },
    NodeMetric {
        subsystem: "indices",
        name: "fielddata_evictions",
        help: "Evictions from field data",
        metric_type: MetricType::Counter,
        labels: &[],
        value: |n| n.indices.fielddata.evictions,
    },
    NodeMetric {
        subsystem: "indices",
        name: "indexing_index_time_seconds_total",
        help: "Cumulative index time in seconds",
        metric_type: MetricType::Counter,
        labels: &[],
        value: |n| millis_to_seconds(n.indices.indexing.index_time_in_millis),
    },
    NodeMetric {
        subsystem: "indices",
        name: "search_query_time_seconds",
        help: "Total search query time in seconds",
        metric_type: MetricType::Counter,
        labels: &[],
        value: |n| millis_to_seconds(n.indices.search.query_time_in_millis),
    },
    NodeMetric {
        subsystem: "indices",
        name: "merges_total",
        help: "Total merges",
        metric_type: MetricType::Counter,
        labels: &[],
        value: |n| n.indices.merges.total,
    },
    NodeMetric {
        subsystem: "indices",
        name: "refresh_total",
        help: "Total refreshes",
        metric_type: MetricType::Counter,
        labels: &[],
        value: |n| n.indices.refresh.total,
    },
    NodeMetric {
        subsystem: "transport",
        name: "rx_size_bytes_total",
        help: "Total number of bytes received",
        metric_type: MetricType::Counter,
        labels: &[],
        value: |n| n.transport.rx_size_in_bytes,
    },
    NodeMetric {
        subsystem: "transport",
        name: "tx_size_bytes_total",
        help: "Total number of bytes sent",
        metric_type: MetricType::Counter,
        labels: &[],
        value: |n| n.transport.tx_size_in_bytes,
    },
];

fn gc_count_descriptor() -> Descriptor {
    Descriptor::counter(
        metric_name("jvm_gc", "collection_seconds_count"),
        "Count of JVM GC runs",
    )
}

fn gc_time_descriptor() -> Descriptor {
    Descriptor::counter(
        metric_name("jvm_gc", "collection_seconds_sum"),
        "GC run time in seconds",
    )
}

fn fs_descriptors() -> [Descriptor; 3] {
    [
        Descriptor::gauge(
            metric_name("filesystem_data", "size_bytes"),
            "Size of block device in bytes",
        ),
        Descriptor::gauge(
            metric_name("filesystem_data", "free_bytes"),
            "Free space on block device in bytes",
        ),
        Descriptor::gauge(
            metric_name("filesystem_data", "available_bytes"),
            "Available space on block device in bytes",
        ),
    ]
}

fn breaker_descriptors() -> [Descriptor; 3] {
    [
        Descriptor::gauge(
            metric_name("breakers", "estimated_size_bytes"),
            "Estimated size in bytes of breaker",
        ),
        Descriptor::gauge(
            metric_name("breakers", "limit_size_bytes"),
            "Limit size in bytes for breaker",
        ),
        Descriptor::counter(
            metric_name("breakers", "tripped"),
            "tripped for breaker",
        ),
    ]
}

/// Node roles as exposed in labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Roles {
    master: bool,
    data: bool,
    ingest: bool,
}

impl Roles {
    /// Roles from the `roles` list (5.x and later), or from node attributes
    /// on older clusters where master and data default to true.
    fn of(node: &NodeStats) -> Self {
        match &node.roles {
            Some(roles) => Self {
                master: roles.iter().any(|r| r == "master"),
                data: roles.iter().any(|r| r == "data" || r.starts_with("data_")),
                ingest: roles.iter().any(|r| r == "ingest"),
            },
            None => {
                let attribute = |key: &str| {
                    node.attributes
                        .get(key)
                        .is_none_or(|value| value != "false")
                };
                Self {
                    master: attribute("master"),
                    data: attribute("data"),
                    ingest: false,
                }
            }
        }
    }

    /// Coordinating-only node: neither master-eligible nor data.
    fn client(&self) -> bool {
        !self.master && !self.data
    }
}

fn flag(value: bool) -> String {
    value.to_string()
}

/// Reports `/_nodes/stats` for all nodes or a single selected node.
#[derive(Debug, Clone)]
pub struct NodesCollector {
    client: EsClient,
    selection: NodeSelection,
}

impl NodesCollector {
    pub fn new(client: EsClient, selection: NodeSelection) -> Self {
        Self { client, selection }
    }

    pub fn selection(&self) -> &NodeSelection {
        &self.selection
    }

    pub fn describe(&self) -> Vec<Descriptor> {
        let mut descriptors: Vec<Descriptor> = Vec::new();
        for metric in NODE_METRICS {
            let descriptor = metric.descriptor();
            if !descriptors.contains(&descriptor) {
                descriptors.push(descriptor);
            }
        }
        descriptors.push(gc_count_descriptor());
        descriptors.push(gc_time_descriptor());
        descriptors.extend(fs_descriptors());
        descriptors.extend(breaker_descriptors());
        descriptors
    }

    pub async fn collect(&self) -> Result<Vec<MetricFamily>, CollectError> {
        let stats: NodesStatsResponse = self
            .client
            .get_json(&self.selection.stats_path(), &[])
            .await?;
        Ok(families(&stats))
    }
}

pub(crate) fn families(stats: &NodesStatsResponse) -> Vec<MetricFamily> {
    let mut families: Vec<MetricFamily> = Vec::new();

    let mut gc_count = gc_count_descriptor().family();
    let mut gc_time = gc_time_descriptor().family();
    let [mut fs_size, mut fs_free, mut fs_available] = fs_descriptors().map(|d| d.family());
    let [mut breaker_estimated, mut breaker_limit, mut breaker_tripped] =
        breaker_descriptors().map(|d| d.family());

    for node in stats.nodes.values() {
        let roles = Roles::of(node);
        let base = vec![
            ("cluster".to_string(), stats.cluster_name.clone()),
            ("host".to_string(), node.host.clone()),
            ("name".to_string(), node.name.clone()),
            ("es_master_node".to_string(), flag(roles.master)),
            ("es_data_node".to_string(), flag(roles.data)),
            ("es_ingest_node".to_string(), flag(roles.ingest)),
            ("es_client_node".to_string(), flag(roles.client())),
        ];
        let with = |extra: &[(&str, &str)]| {
            let mut labels = base.clone();
            labels.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
            labels
        };

        for metric in NODE_METRICS {
            if let Some(value) = (metric.value)(node) {
                let mut family = metric.descriptor().family();
                family.push(with(metric.labels), value);
                families.push(family);
            }
        }

        for (gc, collector) in &node.jvm.gc.collectors {
            if let Some(count) = collector.collection_count {
                gc_count.push(with(&[("gc", gc.as_str())]), count);
            }
            if let Some(time) = millis_to_seconds(collector.collection_time_in_millis) {
                gc_time.push(with(&[("gc", gc.as_str())]), time);
            }
        }

        for data in &node.fs.data {
            let labels = with(&[("path", data.path.as_str()), ("mount", data.mount.as_str())]);
            if let Some(total) = data.total_in_bytes {
                fs_size.push(labels.clone(), total);
            }
            if let Some(free) = data.free_in_bytes {
                fs_free.push(labels.clone(), free);
            }
            if let Some(available) = data.available_in_bytes {
                fs_available.push(labels, available);
            }
        }

        for (breaker, stats) in &node.breakers {
            let labels = with(&[("breaker", breaker.as_str())]);
            if let Some(estimated) = stats.estimated_size_in_bytes {
                breaker_estimated.push(labels.clone(), estimated);
            }
            if let Some(limit) = stats.limit_size_in_bytes {
                breaker_limit.push(labels.clone(), limit);
            }
            if let Some(tripped) = stats.tripped {
                breaker_tripped.push(labels, tripped);
            }
        }
    }

    families.extend([
        gc_count,
        gc_time,
        fs_size,
        fs_free,
        fs_available,
        breaker_estimated,
        breaker_limit,
        breaker_tripped,
    ]);
    non_empty(families)
}
