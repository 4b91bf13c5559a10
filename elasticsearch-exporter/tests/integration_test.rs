//! Integration tests for the Elasticsearch exporter.
//!
//! These tests run a fake Elasticsearch API on an ephemeral port and scrape
//! the exporter over HTTP, covering the full flow from upstream polling to
//! the rendered exposition document.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use clap::Parser;
use elasticsearch_exporter::error::ExporterError;
use elasticsearch_exporter::{Args, CollectorKind, ExporterConfig, build_server};
use serde_json::json;
use tokio::net::TcpListener;

/// How the fake node stats endpoint misbehaves.
#[derive(Clone, Copy, Default)]
struct Failures {
    /// Respond with HTTP 500.
    nodes: bool,
    /// Respond only after this delay.
    nodes_delay: Option<Duration>,
}

async fn cluster_health() -> Response {
    axum::Json(json!({
        "cluster_name": "test-cluster",
        "status": "green",
        "number_of_nodes": 3,
        "number_of_data_nodes": 2,
        "active_primary_shards": 10,
        "active_shards": 20,
        "relocating_shards": 0,
        "initializing_shards": 0,
        "unassigned_shards": 0
    }))
    .into_response()
}

async fn node_stats(State(failures): State<Failures>) -> Response {
    if let Some(delay) = failures.nodes_delay {
        tokio::time::sleep(delay).await;
    }
    if failures.nodes {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    axum::Json(json!({
        "cluster_name": "test-cluster",
        "nodes": {
            "n1": {
                "name": "es-0",
                "host": "10.0.0.1",
                "roles": ["master", "data", "ingest"],
                "jvm": {"mem": {"heap_used_in_bytes": 512, "heap_max_in_bytes": 1024}},
                "process": {"open_file_descriptors": 100, "max_file_descriptors": 1000}
            }
        }
    }))
    .into_response()
}

async fn index_stats(RawQuery(query): RawQuery) -> Response {
    let shards = query.as_deref() == Some("level=shards");
    let mut index = json!({
        "primaries": {"docs": {"count": 42, "deleted": 0}, "store": {"size_in_bytes": 1000}},
        "total": {"docs": {"count": 84, "deleted": 0}, "store": {"size_in_bytes": 2000}}
    });
    if shards {
        index["shards"] = json!({
            "0": [{"routing": {"state": "STARTED", "primary": true, "node": "n1"}, "docs": {"count": 42}}]
        });
    }
    axum::Json(json!({"indices": {"logs": index}})).into_response()
}

async fn repositories() -> Response {
    axum::Json(json!({"backups": {"type": "fs", "settings": {"location": "/mnt"}}})).into_response()
}

async fn repository_snapshots(Path(repository): Path<String>) -> Response {
    if repository != "backups" {
        return StatusCode::NOT_FOUND.into_response();
    }
    axum::Json(json!({
        "snapshots": [{
            "snapshot": "snap-1",
            "version": "8.11.1",
            "state": "SUCCESS",
            "indices": ["logs"],
            "start_time_in_millis": 1700000000000u64,
            "end_time_in_millis": 1700000010000u64,
            "failures": [],
            "shards": {"total": 1, "failed": 0, "successful": 1}
        }]
    }))
    .into_response()
}

async fn cluster_settings() -> Response {
    axum::Json(json!({
        "persistent": {"cluster": {"routing": {"allocation": {"enable": "primaries"}}}},
        "transient": {},
        "defaults": {"cluster.max_shards_per_node": "1000"}
    }))
    .into_response()
}

/// Start a fake Elasticsearch API, returning its base URL.
async fn start_fake_es(failures: Failures) -> String {
    let router = Router::new()
        .route("/_cluster/health", get(cluster_health))
        .route("/_nodes/stats", get(node_stats))
        .route("/_nodes/_local/stats", get(node_stats))
        .route("/_all/_stats", get(index_stats))
        .route("/_snapshot", get(repositories))
        .route("/_snapshot/:repository/_all", get(repository_snapshots))
        .route("/_cluster/settings", get(cluster_settings))
        .with_state(failures);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn resolve(es_uri: &str, flags: &[&str]) -> ExporterConfig {
    let default_timeout: &[&str] = if flags.contains(&"--es.timeout") {
        &[]
    } else {
        &["--es.timeout", "2s"]
    };
    let args = Args::parse_from(
        [
            "elasticsearch-exporter",
            "--es.uri",
            es_uri,
            "--web.listen-address",
            "127.0.0.1:0",
        ]
        .into_iter()
        .chain(default_timeout.iter().copied())
        .chain(flags.iter().copied()),
    );
    ExporterConfig::resolve(args, None).unwrap()
}

/// Start the exporter against `es_uri`, returning its listen address.
async fn start_exporter(es_uri: &str, flags: &[&str]) -> SocketAddr {
    let config = resolve(es_uri, flags);
    let bound = build_server(&config).unwrap().bind().await.unwrap();
    let addr = bound.local_addr();
    tokio::spawn(bound.serve());
    addr
}

async fn scrape(addr: SocketAddr) -> (StatusCode, String, String) {
    let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    (status, content_type, response.text().await.unwrap())
}

#[tokio::test]
async fn test_default_scrape() {
    let es = start_fake_es(Failures::default()).await;
    let addr = start_exporter(&es, &[]).await;

    let (status, content_type, body) = scrape(addr).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/plain; version=0.0.4; charset=utf-8");

    assert!(body.contains("elasticsearch_cluster_health_up 1"));
    assert!(body.contains("elasticsearch_node_stats_up 1"));
    assert!(body.contains(
        "elasticsearch_cluster_health_status{cluster=\"test-cluster\",color=\"green\"} 1"
    ));
    assert!(body.contains("elasticsearch_process_open_files_count{"));
    assert!(body.contains("elasticsearch_exporter_build_info{version="));

    // Optional collectors are off by default.
    assert!(!body.contains("elasticsearch_index_stats_up"));
    assert!(!body.contains("elasticsearch_snapshot_stats_up"));
    assert!(!body.contains("elasticsearch_clustersettings_stats_up"));
}

#[tokio::test]
async fn test_all_collectors() {
    let es = start_fake_es(Failures::default()).await;
    let addr = start_exporter(
        &es,
        &["--es.all", "--es.indices", "--es.snapshots", "--es.cluster_settings"],
    )
    .await;

    let (status, _, body) = scrape(addr).await;
    assert_eq!(status, StatusCode::OK);

    assert!(body.contains("elasticsearch_index_stats_up 1"));
    assert!(body.contains("elasticsearch_indices_docs_primary{index=\"logs\"} 42"));
    assert!(!body.contains("elasticsearch_indices_shards_docs"));

    assert!(body.contains("elasticsearch_snapshot_stats_up 1"));
    assert!(body.contains(
        "elasticsearch_snapshot_stats_number_of_snapshots{repository=\"backups\"} 1"
    ));

    assert!(body.contains("elasticsearch_clustersettings_stats_up 1"));
    assert!(body.contains("elasticsearch_clustersettings_stats_shard_allocation_enabled 1"));
    assert!(body.contains("elasticsearch_clustersettings_stats_max_shards_per_node 1000"));
}

#[tokio::test]
async fn test_shards_enable_index_collector() {
    let es = start_fake_es(Failures::default()).await;
    let addr = start_exporter(&es, &["--es.shards"]).await;

    let (_, _, body) = scrape(addr).await;
    assert!(body.contains("elasticsearch_index_stats_up 1"));
    assert!(body.contains(
        "elasticsearch_indices_shards_docs{index=\"logs\",node=\"n1\",primary=\"true\",shard=\"0\"} 42"
    ));
}

#[tokio::test]
async fn test_failing_endpoint_is_isolated() {
    let es = start_fake_es(Failures {
        nodes: true,
        ..Failures::default()
    })
    .await;
    let addr = start_exporter(&es, &[]).await;

    let (status, _, body) = scrape(addr).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("elasticsearch_node_stats_up 0"));
    assert!(body.contains("elasticsearch_cluster_health_up 1"));
    assert!(body.contains(
        "elasticsearch_cluster_health_number_of_nodes{cluster=\"test-cluster\"} 3"
    ));
    assert!(!body.contains("elasticsearch_process_open_files_count"));
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let es = start_fake_es(Failures {
        nodes_delay: Some(Duration::from_secs(2)),
        ..Failures::default()
    })
    .await;
    let addr = start_exporter(&es, &["--es.timeout", "200ms"]).await;

    let start = Instant::now();
    let (status, _, body) = scrape(addr).await;
    let elapsed = start.elapsed();

    assert_eq!(status, StatusCode::OK);
    assert!(elapsed < Duration::from_secs(1), "scrape took {elapsed:?}");
    assert!(body.contains("elasticsearch_node_stats_up 0"));
    assert!(body.contains("elasticsearch_cluster_health_up 1"));
}

#[tokio::test]
async fn test_unreachable_upstream() {
    // Grab a free port, then close it so nothing is listening there.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let es = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let addr = start_exporter(&es, &["--es.indices"]).await;

    let (status, _, body) = scrape(addr).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("elasticsearch_cluster_health_up 0"));
    assert!(body.contains("elasticsearch_node_stats_up 0"));
    assert!(body.contains("elasticsearch_index_stats_up 0"));
    assert!(body.contains("elasticsearch_exporter_build_info"));
}

#[tokio::test]
async fn test_concurrent_scrapes_are_consistent() {
    let es = start_fake_es(Failures::default()).await;
    let addr = start_exporter(&es, &["--es.indices", "--es.snapshots"]).await;

    let scrapes = futures::future::join_all((0..8).map(|_| scrape(addr))).await;
    let (_, _, first) = &scrapes[0];
    for (status, _, body) in &scrapes {
        assert_eq!(*status, StatusCode::OK);
        assert_eq!(body, first);
    }
}

#[tokio::test]
async fn test_landing_page() {
    let es = start_fake_es(Failures::default()).await;
    let addr = start_exporter(&es, &[]).await;

    let body = reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("href=\"/metrics\""));
}

#[tokio::test]
async fn test_missing_ca_is_fatal() {
    let config = resolve(
        "https://localhost:9200",
        &["--es.ca", "/nonexistent/elasticsearch-ca.pem"],
    );
    let result = build_server(&config);
    assert!(matches!(result, Err(ExporterError::Tls(_))));
}

#[test]
fn test_es_uri_environment_override() {
    let args = Args::parse_from(["elasticsearch-exporter", "--es.uri", "http://es1:9200"]);
    let config = ExporterConfig::resolve(args, Some("http://es2:9200".to_string())).unwrap();
    assert_eq!(config.es_url.as_str(), "http://es2:9200/");
}

#[test]
fn test_shards_flag_registry() {
    let config = resolve("http://localhost:9200", &["--es.shards"]);
    let client = elasticsearch_exporter::EsClient::new(
        config.es_url.clone(),
        config.timeout,
        elasticsearch_exporter::TransportContext::Plain,
    )
    .unwrap();
    let registry = elasticsearch_exporter::CollectorRegistry::from_config(&config, &client);
    assert_eq!(
        registry.kinds(),
        vec![
            CollectorKind::ClusterHealth,
            CollectorKind::Nodes,
            CollectorKind::Indices
        ]
    );
}
