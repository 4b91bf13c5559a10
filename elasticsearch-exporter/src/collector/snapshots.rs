//! Snapshot repository collector (`/_snapshot`).

use std::collections::BTreeMap;

use futures::future::try_join_all;
use serde::Deserialize;

use super::{metric_name, non_empty};
use crate::client::EsClient;
use crate::error::CollectError;
use crate::exposition::{Descriptor, MetricFamily};

const SUBSYSTEM: &str = "snapshot_stats";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SnapshotsResponse {
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Snapshot {
    snapshot: String,
    version: String,
    state: String,
    indices: Vec<String>,
    start_time_in_millis: f64,
    end_time_in_millis: f64,
    failures: Vec<serde_json::Value>,
    shards: SnapshotShards,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SnapshotShards {
    total: f64,
    failed: f64,
    successful: f64,
}

struct RepositoryGauge {
    name: &'static str,
    help: &'static str,
    value: fn(&[Snapshot]) -> Option<f64>,
}

const REPOSITORY_GAUGES: &[RepositoryGauge] = &[
    RepositoryGauge {
        name: "number_of_snapshots",
        help: "Number of snapshots in a repository",
        value: |s| Some(s.len() as f64),
    },
    RepositoryGauge {
        name: "oldest_snapshot_timestamp",
        help: "Timestamp of the oldest snapshot",
        value: |s| s.first().map(|s| s.start_time_in_millis / 1000.0),
    },
    RepositoryGauge {
        name: "latest_snapshot_timestamp_seconds",
        help: "Timestamp of the latest SUCCESS or PARTIAL snapshot",
        value: |s| {
            s.iter()
                .rev()
                .find(|s| s.state == "SUCCESS" || s.state == "PARTIAL")
                .map(|s| s.start_time_in_millis / 1000.0)
        },
    },
];

struct SnapshotGauge {
    name: &'static str,
    help: &'static str,
    value: fn(&Snapshot) -> f64,
}

const SNAPSHOT_GAUGES: &[SnapshotGauge] = &[
    SnapshotGauge {
        name: "snapshot_number_of_indices",
        help: "Number of indices in the last snapshot",
        value: |s| s.indices.len() as f64,
    },
    SnapshotGauge {
        name: "snapshot_start_time_timestamp",
        help: "Last snapshot start timestamp",
        value: |s| s.start_time_in_millis / 1000.0,
    },
    SnapshotGauge {
        name: "snapshot_end_time_timestamp",
        help: "Last snapshot end timestamp",
        value: |s| s.end_time_in_millis / 1000.0,
    },
    SnapshotGauge {
        name: "snapshot_number_of_failures",
        help: "Last snapshot number of failures",
        value: |s| s.failures.len() as f64,
    },
    SnapshotGauge {
        name: "snapshot_total_shards",
        help: "Last snapshot total shards",
        value: |s| s.shards.total,
    },
    SnapshotGauge {
        name: "snapshot_failed_shards",
        help: "Last snapshot failed shards",
        value: |s| s.shards.failed,
    },
    SnapshotGauge {
        name: "snapshot_successful_shards",
        help: "Last snapshot successful shards",
        value: |s| s.shards.successful,
    },
];

/// Reports every snapshot repository and its most recent snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotsCollector {
    client: EsClient,
}

impl SnapshotsCollector {
    pub fn new(client: EsClient) -> Self {
        Self { client }
    }

    pub fn describe(&self) -> Vec<Descriptor> {
        REPOSITORY_GAUGES
            .iter()
            .map(|g| Descriptor::gauge(metric_name(SUBSYSTEM, g.name), g.help))
            .chain(
                SNAPSHOT_GAUGES
                    .iter()
                    .map(|g| Descriptor::gauge(metric_name(SUBSYSTEM, g.name), g.help)),
            )
            .collect()
    }

    pub async fn collect(&self) -> Result<Vec<MetricFamily>, CollectError> {
        let repositories: BTreeMap<String, serde_json::Value> =
            self.client.get_json("/_snapshot", &[]).await?;

        let snapshots = try_join_all(repositories.keys().map(|repository| async move {
            let path = format!("/_snapshot/{repository}/_all");
            let response: SnapshotsResponse = self.client.get_json(&path, &[]).await?;
            Ok::<_, CollectError>((repository.as_str(), response))
        }))
        .await?;

        Ok(families(&snapshots))
    }
}

pub(crate) fn families(repositories: &[(&str, SnapshotsResponse)]) -> Vec<MetricFamily> {
    let mut families: Vec<MetricFamily> = REPOSITORY_GAUGES
        .iter()
        .map(|gauge| {
            let mut family =
                Descriptor::gauge(metric_name(SUBSYSTEM, gauge.name), gauge.help).family();
            for (repository, response) in repositories {
                if let Some(value) = (gauge.value)(&response.snapshots) {
                    family.push([("repository", *repository)], value);
                }
            }
            family
        })
        .collect();

    families.extend(SNAPSHOT_GAUGES.iter().map(|gauge| {
        let mut family =
            Descriptor::gauge(metric_name(SUBSYSTEM, gauge.name), gauge.help).family();
        for (repository, response) in repositories {
            let Some(latest) = response.snapshots.last() else {
                continue;
            };
            family.push(
                [
                    ("repository", *repository),
                    ("state", latest.state.as_str()),
                    ("version", latest.version.as_str()),
                    ("snapshot", latest.snapshot.as_str()),
                ],
                (gauge.value)(latest),
            );
        }
        family
    }));

    non_empty(families)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposition::render;

    const BACKUPS_JSON: &str = r#"{
        "snapshots": [
            {
                "snapshot": "nightly-1",
                "uuid": "a",
                "version": "8.11.1",
                "indices": ["logs", "metrics"],
                "state": "SUCCESS",
                "start_time_in_millis": 1700000000000,
                "end_time_in_millis": 1700000060000,
                "failures": [],
                "shards": {"total": 4, "failed": 0, "successful": 4}
            },
            {
                "snapshot": "nightly-2",
                "uuid": "b",
                "version": "8.11.1",
                "indices": ["logs"],
                "state": "FAILED",
                "start_time_in_millis": 1700086400000,
                "end_time_in_millis": 1700086460000,
                "failures": [{"index": "logs", "reason": "disk full"}],
                "shards": {"total": 2, "failed": 1, "successful": 1}
            }
        ]
    }"#;

    fn rendered() -> String {
        let backups: SnapshotsResponse = serde_json::from_str(BACKUPS_JSON).unwrap();
        let empty = SnapshotsResponse::default();
        render(families(&[("backups", backups), ("empty", empty)])).unwrap()
    }

    #[test]
    fn test_repository_metrics() {
        let output = rendered();

        assert!(output.contains(
            "elasticsearch_snapshot_stats_number_of_snapshots{repository=\"backups\"} 2"
        ));
        assert!(output.contains(
            "elasticsearch_snapshot_stats_number_of_snapshots{repository=\"empty\"} 0"
        ));
        assert!(output.contains(
            "elasticsearch_snapshot_stats_oldest_snapshot_timestamp{repository=\"backups\"} 1700000000"
        ));
        // The latest snapshot failed, so the latest successful one is reported.
        assert!(output.contains(
            "elasticsearch_snapshot_stats_latest_snapshot_timestamp_seconds{repository=\"backups\"} 1700000000"
        ));
        assert!(!output.contains("oldest_snapshot_timestamp{repository=\"empty\"}"));
    }

    #[test]
    fn test_latest_snapshot_metrics() {
        let output = rendered();
        let labels = "{repository=\"backups\",snapshot=\"nightly-2\",state=\"FAILED\",version=\"8.11.1\"}";

        assert!(output.contains(&format!(
            "elasticsearch_snapshot_stats_snapshot_number_of_indices{labels} 1"
        )));
        assert!(output.contains(&format!(
            "elasticsearch_snapshot_stats_snapshot_number_of_failures{labels} 1"
        )));
        assert!(output.contains(&format!(
            "elasticsearch_snapshot_stats_snapshot_failed_shards{labels} 1"
        )));
        assert!(output.contains(&format!(
            "elasticsearch_snapshot_stats_snapshot_end_time_timestamp{labels} 1700086460"
        )));
        assert!(!output.contains("nightly-1"));
    }

    #[test]
    fn test_no_repositories() {
        assert!(families(&[]).is_empty());
    }
}
