//! Per-request scrape coordination.

use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::EXPORTER_NAME;
use crate::exposition::{self, Descriptor, MetricFamily, RenderError};
use crate::registry::CollectorRegistry;

/// Runs every registered collector for one scrape and renders the result.
///
/// Holds no per-scrape state, so one coordinator serves concurrent requests.
#[derive(Debug)]
pub struct ScrapeCoordinator {
    registry: CollectorRegistry,
}

impl ScrapeCoordinator {
    pub fn new(registry: CollectorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CollectorRegistry {
        &self.registry
    }

    /// Poll all collectors concurrently and render one exposition document.
    ///
    /// A failing collector is reported through its `up` indicator and does
    /// not affect the others. Only a rendering error fails the scrape.
    pub async fn scrape(&self) -> Result<String, RenderError> {
        let start = Instant::now();
        let collectors = self.registry.collectors();

        // join_all yields results in input order.
        let results = join_all(collectors.iter().map(|c| c.collect())).await;

        let mut families: Vec<MetricFamily> = Vec::new();
        for (collector, result) in collectors.iter().zip(results) {
            let kind = collector.kind();
            match result {
                Ok(collected) => {
                    families.extend(collected);
                    families.push(kind.up_family(true));
                }
                Err(e) => {
                    warn!(collector = %kind, error = %e, "Collector failed");
                    families.push(kind.up_family(false));
                }
            }
        }
        families.push(build_info());

        let body = exposition::render(families)?;
        debug!(
            collectors = collectors.len(),
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Scrape complete"
        );
        Ok(body)
    }
}

/// Constant series identifying the exporter build.
fn build_info() -> MetricFamily {
    Descriptor::gauge(
        format!("{EXPORTER_NAME}_build_info"),
        "A metric with a constant '1' value labeled by the exporter version.",
    )
    .family()
    .with_sample([("version", env!("CARGO_PKG_VERSION"))], 1.0)
}
