//! Variant merging
//!
//! A protocol is exposed upstream as several variants (aave, aave-v2,
//! aave-v3). The canonical series is their per-date sum, with one subtle
//! rule: a variant with no value at a date contributes nothing, and a date
//! where *no* variant reports a value is omitted entirely. A zero in the
//! output therefore always means "a variant explicitly reported 0", never
//! "data was missing".

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::errors::ProcessError;
use crate::registry::{Metric, ProtocolSpec};
use crate::sources::VariantSeries;

use super::{NormalizedSeries, SeriesPoint};

/// Merge per-variant raw points into one canonical series.
///
/// Fails with `NoDataForProtocol` when no variant contributes a single
/// usable value, so the caller can exclude the protocol with an explicit
/// warning instead of leaving a silent gap.
pub fn normalize(
    spec: &ProtocolSpec,
    raw_by_variant: &VariantSeries,
    metric: Metric,
) -> Result<NormalizedSeries, ProcessError> {
    let mut merged: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();

    for variant in &spec.upstream_ids {
        let Some(points) = raw_by_variant.get(variant) else {
            continue; // absent variant contributes nothing
        };
        for point in points {
            let slot = merged.entry(point.date).or_insert(None);
            *slot = merge_value(*slot, point.value);
        }
    }

    let points: Vec<SeriesPoint> = merged
        .into_iter()
        .filter_map(|(date, value)| value.map(|value| SeriesPoint { date, value }))
        .collect();

    if points.is_empty() {
        return Err(ProcessError::NoDataForProtocol {
            protocol: spec.canonical_name.clone(),
            metric,
        });
    }

    Ok(NormalizedSeries {
        protocol: spec.canonical_name.clone(),
        metric,
        points,
    })
}

/// The merge reducer: missing contributes nothing, present values sum.
/// `None + None = None` is what keeps "no data" distinct from "zero".
fn merge_value(acc: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (acc, value) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(v)) => Some(v),
        (Some(a), Some(v)) => Some(a + v),
    }
}
