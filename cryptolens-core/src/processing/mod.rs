//! Normalization and aggregation
//!
//! Pure computation over already-fetched raw data: no IO, no shared state.
//! `normalizer` merges per-variant raw series into one canonical series per
//! protocol and metric; `aggregator` derives calendar-bucketed metrics
//! (annual/monthly revenue, quarter-over-quarter growth) from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::registry::Metric;

pub mod aggregator;
pub mod normalizer;

pub use aggregator::{annual_revenue, monthly_revenue, qoq_growth};
pub use aggregator::{AnnualRevenue, MonthlyRevenue, QoqGrowth, Quarter};
pub use normalizer::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// The canonical, variant-merged series for one protocol and metric.
/// Points are sorted ascending by date with no duplicates; dates where no
/// variant reported a value are absent, never zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSeries {
    pub protocol: String,
    pub metric: Metric,
    pub points: Vec<SeriesPoint>,
}

impl NormalizedSeries {
    /// Latest observation, if any.
    pub fn latest(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }
}
