//! CryptoLens Core
//!
//! Processing core for the CryptoLens DeFi dashboard: fetches protocol
//! metrics (TVL, fees, revenue, market cap) from DeFiLlama, merges version
//! variants into canonical per-protocol series, derives period aggregates
//! and assembles one comparable dataset for the chart layer.

pub mod charts;
pub mod dataset;
pub mod errors;
pub mod processing;
pub mod registry;
pub mod sources;
pub mod store;

// Re-export main types for easy access
pub use charts::{build_dashboard, ChartPoint, ChartSpec};
pub use dataset::{build, export_rows, top_by_market_cap, Dataset, DatasetReport, DatasetRow};
pub use errors::{ErrorSeverity, ProcessError, ProcessWarning, WarningReason};
pub use processing::{normalize, NormalizedSeries, QoqGrowth, Quarter, SeriesPoint};
pub use registry::{Chain, Metric, ProtocolRegistry, ProtocolSpec};
pub use sources::{DefiLlamaClient, MetricsSource, RawArchive, RawPoint};
pub use store::DataStore;

use chrono::Utc;
use tracing::{info, warn};

/// Main interface tying the three pipeline stages together. Each stage
/// reads the previous stage's artifact from the store and writes its own,
/// so stages can be run independently (and re-run on the same input).
pub struct MetricsPipeline {
    registry: ProtocolRegistry,
    store: DataStore,
}

impl MetricsPipeline {
    pub fn new(registry: ProtocolRegistry, store: DataStore) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// Fetch raw data for every registered protocol and persist the
    /// archive. Per-variant failures are returned as warnings; the stage
    /// itself only fails on storage problems.
    pub async fn fetch(
        &self,
        source: &dyn MetricsSource,
    ) -> Result<Vec<ProcessWarning>, ProcessError> {
        let mut archive = RawArchive::new(Utc::now());
        let mut warnings = Vec::new();

        for spec in self.registry.all_specs() {
            info!("Fetching {}", spec.canonical_name);
            match source.fetch_protocol(spec).await {
                Ok(outcome) => {
                    warnings.extend(outcome.warnings);
                    archive
                        .protocols
                        .insert(spec.canonical_name.clone(), outcome.data);
                }
                Err(e) if !e.is_fatal() => {
                    warn!("Fetch failed for {}: {e}", spec.canonical_name);
                    warnings.push(ProcessWarning {
                        protocol: spec.canonical_name.clone(),
                        metric: None,
                        reason: WarningReason::FetchFailed {
                            variant: spec.upstream_ids.join(","),
                            detail: e.to_string(),
                        },
                    });
                }
                Err(e) => return Err(e),
            }
        }

        self.store.save_raw(&archive)?;
        Ok(warnings)
    }

    /// Normalize and aggregate the raw archive into the dataset report and
    /// persist it. Fails only on fatal errors (storage, empty dataset).
    pub fn process(&self) -> Result<DatasetReport, ProcessError> {
        let (archive, decode_warnings) = self.store.load_raw()?;
        let mut report = dataset::build(&self.registry, &archive)?;
        report.warnings.splice(0..0, decode_warnings);

        self.store.save_report(&report)?;
        Ok(report)
    }

    /// Shape the processed dataset into chart specs and persist them.
    pub fn visualize(&self) -> Result<Vec<ChartSpec>, ProcessError> {
        let report = self.store.load_report()?;
        let charts = charts::build_dashboard(&report.dataset);
        self.store.save_charts(&charts)?;
        Ok(charts)
    }
}
