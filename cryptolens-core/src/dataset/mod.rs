//! Dataset assembly
//!
//! Turns raw per-protocol data into the single comparable artifact the
//! chart layer consumes. One bad protocol/metric never blocks the rest:
//! each failure is downgraded to a structured warning carried in the
//! report, and only a run where *nothing* normalizes is fatal.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{ProcessError, ProcessWarning, WarningReason};
use crate::processing::{
    annual_revenue, monthly_revenue, normalize, qoq_growth, AnnualRevenue, MonthlyRevenue,
    NormalizedSeries, QoqGrowth,
};
use crate::registry::{Metric, ProtocolRegistry};
use crate::sources::{RawArchive, RawProtocolData, VariantSeries};

/// All processed metrics for one protocol. A `None` series means the
/// protocol/metric combination was excluded (see the report's warnings).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolMetrics {
    pub tvl: Option<NormalizedSeries>,
    pub fees: Option<NormalizedSeries>,
    pub revenue: Option<NormalizedSeries>,
    pub market_cap: Option<NormalizedSeries>,
    pub annual_revenue: Vec<AnnualRevenue>,
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub qoq_growth: Vec<QoqGrowth>,
}

impl ProtocolMetrics {
    pub fn series(&self, metric: Metric) -> Option<&NormalizedSeries> {
        match metric {
            Metric::Tvl => self.tvl.as_ref(),
            Metric::Fees => self.fees.as_ref(),
            Metric::Revenue => self.revenue.as_ref(),
            Metric::MarketCap => self.market_cap.as_ref(),
        }
    }

    fn set_series(&mut self, metric: Metric, series: NormalizedSeries) {
        match metric {
            Metric::Tvl => self.tvl = Some(series),
            Metric::Fees => self.fees = Some(series),
            Metric::Revenue => self.revenue = Some(series),
            Metric::MarketCap => self.market_cap = Some(series),
        }
    }

    fn has_any_series(&self) -> bool {
        Metric::ALL.iter().any(|m| self.series(*m).is_some())
    }
}

/// The final comparable dataset. `protocols` carries registry order, which
/// is what makes repeated runs over the same input produce identical chart
/// ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub generated_at: DateTime<Utc>,
    pub protocols: Vec<String>,
    pub metrics: HashMap<String, ProtocolMetrics>,
}

/// Dataset plus every warning raised while building it. Warnings are part
/// of the artifact, not log noise: tests and callers assert on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetReport {
    pub dataset: Dataset,
    pub warnings: Vec<ProcessWarning>,
}

/// Flat export row, one per (protocol, metric, timestamp) and one per
/// (protocol, metric, period) for aggregates. Column names are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub protocol: String,
    pub metric: String,
    pub timestamp_or_period: String,
    pub value: Option<f64>,
    pub is_missing: bool,
}

/// Build the dataset for every registered protocol.
///
/// A `NoDataForProtocol` on one protocol/metric excludes only that
/// combination; protocols with no usable metric at all are left out of the
/// dataset entirely (with warnings for each metric). Fails with
/// `EmptyDataset` only when the whole registry produced nothing.
pub fn build(
    registry: &ProtocolRegistry,
    archive: &RawArchive,
) -> Result<DatasetReport, ProcessError> {
    let mut dataset = Dataset {
        generated_at: Utc::now(),
        protocols: Vec::new(),
        metrics: HashMap::new(),
    };
    let mut warnings = Vec::new();

    let no_data = RawProtocolData::default();
    let empty_variants = VariantSeries::new();

    for spec in registry.all_specs() {
        let raw = archive
            .protocols
            .get(&spec.canonical_name)
            .unwrap_or(&no_data);

        let mut metrics = ProtocolMetrics::default();
        for metric in Metric::ALL {
            let raw_by_variant = raw.by_metric.get(&metric).unwrap_or(&empty_variants);
            match normalize(spec, raw_by_variant, metric) {
                Ok(series) => metrics.set_series(metric, series),
                Err(ProcessError::NoDataForProtocol { protocol, metric }) => {
                    warn!("Excluding {protocol}/{metric}: no upstream data");
                    warnings.push(ProcessWarning {
                        protocol,
                        metric: Some(metric),
                        reason: WarningReason::NoData,
                    });
                }
                Err(other) => return Err(other),
            }
        }

        if let Some(revenue) = &metrics.revenue {
            metrics.annual_revenue = annual_revenue(revenue);
            metrics.monthly_revenue = monthly_revenue(revenue);
            metrics.qoq_growth = qoq_growth(revenue);
        }

        if metrics.has_any_series() {
            dataset.protocols.push(spec.canonical_name.clone());
            dataset.metrics.insert(spec.canonical_name.clone(), metrics);
        }
    }

    if dataset.protocols.is_empty() {
        return Err(ProcessError::EmptyDataset);
    }

    Ok(DatasetReport { dataset, warnings })
}

/// Flatten the dataset into export rows, protocols in dataset order.
pub fn export_rows(dataset: &Dataset) -> Vec<DatasetRow> {
    let mut rows = Vec::new();

    for protocol in &dataset.protocols {
        let Some(metrics) = dataset.metrics.get(protocol) else {
            continue;
        };

        for metric in Metric::ALL {
            if let Some(series) = metrics.series(metric) {
                for point in &series.points {
                    rows.push(DatasetRow {
                        protocol: protocol.clone(),
                        metric: metric.as_str().to_string(),
                        timestamp_or_period: point.date.to_string(),
                        value: Some(point.value),
                        is_missing: false,
                    });
                }
            }
        }

        for annual in &metrics.annual_revenue {
            rows.push(DatasetRow {
                protocol: protocol.clone(),
                metric: "annual_revenue".to_string(),
                timestamp_or_period: annual.year.to_string(),
                value: Some(annual.value),
                is_missing: false,
            });
        }

        for monthly in &metrics.monthly_revenue {
            rows.push(DatasetRow {
                protocol: protocol.clone(),
                metric: "monthly_revenue".to_string(),
                timestamp_or_period: monthly.month.clone(),
                value: Some(monthly.value),
                is_missing: false,
            });
        }

        for growth in &metrics.qoq_growth {
            rows.push(DatasetRow {
                protocol: protocol.clone(),
                metric: "qoq_growth".to_string(),
                timestamp_or_period: growth.quarter.to_string(),
                value: growth.value,
                is_missing: growth.prior_quarter_value_missing,
            });
        }
    }

    rows
}

/// Rank protocols by their latest market cap, keeping the top `n`. A
/// `pinned` protocol present in the dataset is appended even when it does
/// not make the cut.
pub fn top_by_market_cap(dataset: &Dataset, n: usize, pinned: Option<&str>) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = dataset
        .protocols
        .iter()
        .filter_map(|name| {
            let latest = dataset.metrics.get(name)?.market_cap.as_ref()?.latest()?;
            Some((name, latest.value))
        })
        .collect();

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut top: Vec<String> = ranked.iter().take(n).map(|(name, _)| (*name).clone()).collect();

    if let Some(pinned) = pinned {
        if dataset.metrics.contains_key(pinned) && !top.iter().any(|p| p == pinned) {
            top.push(pinned.to_string());
        }
    }

    top
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Chain, ProtocolSpec};
    use crate::sources::RawPoint;

    fn archive_with(
        entries: &[(&str, Metric, &str, &[(&str, Option<f64>)])],
    ) -> RawArchive {
        let mut archive = RawArchive::new(Utc::now());
        for (protocol, metric, variant, points) in entries {
            let data = archive.protocols.entry(protocol.to_string()).or_insert_with(
                RawProtocolData::default,
            );
            data.by_metric.entry(*metric).or_default().insert(
                variant.to_string(),
                points
                    .iter()
                    .map(|(date, value)| RawPoint {
                        date: date.parse().unwrap(),
                        value: *value,
                        variant: variant.to_string(),
                    })
                    .collect(),
            );
        }
        archive
    }

    fn two_protocol_registry() -> ProtocolRegistry {
        ProtocolRegistry::new(vec![
            ProtocolSpec::new("aave", Chain::Ethereum, &["aave", "aave-v2"]),
            ProtocolSpec::new("jupiter", Chain::Solana, &["jupiter"]),
        ])
        .unwrap()
    }

    #[test]
    fn partial_failure_excludes_only_the_failing_protocol() {
        // jupiter has data, aave has none at all: dataset keeps jupiter,
        // warnings record why aave is absent, the run still succeeds.
        let registry = two_protocol_registry();
        let archive = archive_with(&[(
            "jupiter",
            Metric::Tvl,
            "jupiter",
            &[("2023-01-01", Some(10.0))],
        )]);

        let report = build(&registry, &archive).unwrap();
        assert_eq!(report.dataset.protocols, vec!["jupiter"]);

        // One warning per missing aave metric, all structured as NoData.
        let aave: Vec<_> = report
            .warnings
            .iter()
            .filter(|w| w.protocol == "aave")
            .collect();
        assert_eq!(aave.len(), Metric::ALL.len());
        assert!(aave.iter().all(|w| w.reason == WarningReason::NoData));
    }

    #[test]
    fn missing_metric_is_a_warning_not_an_exclusion() {
        let registry = two_protocol_registry();
        let archive = archive_with(&[
            ("aave", Metric::Tvl, "aave", &[("2023-01-01", Some(5.0))]),
            ("jupiter", Metric::Tvl, "jupiter", &[("2023-01-01", Some(10.0))]),
        ]);

        let report = build(&registry, &archive).unwrap();
        assert_eq!(report.dataset.protocols, vec!["aave", "jupiter"]);
        let aave = &report.dataset.metrics["aave"];
        assert!(aave.tvl.is_some());
        assert!(aave.revenue.is_none());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.protocol == "aave" && w.metric == Some(Metric::Revenue)));
    }

    #[test]
    fn total_failure_is_fatal() {
        let registry = two_protocol_registry();
        let archive = RawArchive::new(Utc::now());
        let err = build(&registry, &archive).unwrap_err();
        assert!(matches!(err, ProcessError::EmptyDataset));
    }

    #[test]
    fn protocol_order_follows_registry_not_input() {
        let registry = two_protocol_registry();
        // Archive keyed in reverse; BTreeMap iteration order must not leak
        // into the dataset either way.
        let archive = archive_with(&[
            ("jupiter", Metric::Tvl, "jupiter", &[("2023-01-01", Some(1.0))]),
            ("aave", Metric::Tvl, "aave", &[("2023-01-01", Some(2.0))]),
        ]);

        let report = build(&registry, &archive).unwrap();
        assert_eq!(report.dataset.protocols, vec!["aave", "jupiter"]);

        let again = build(&registry, &archive).unwrap();
        assert_eq!(report.dataset.protocols, again.dataset.protocols);
    }

    #[test]
    fn revenue_drives_the_derived_aggregates() {
        let registry = two_protocol_registry();
        let archive = archive_with(&[(
            "aave",
            Metric::Revenue,
            "aave",
            &[
                ("2023-01-15", Some(1000.0)),
                ("2023-04-15", Some(1500.0)),
            ],
        )]);

        let report = build(&registry, &archive).unwrap();
        let aave = &report.dataset.metrics["aave"];
        assert_eq!(aave.annual_revenue.len(), 1);
        assert_eq!(aave.annual_revenue[0].value, 2500.0);
        assert_eq!(aave.monthly_revenue.len(), 2);
        assert_eq!(aave.qoq_growth.len(), 2);
        assert_eq!(aave.qoq_growth[1].value, Some(0.5));
    }

    #[test]
    fn export_rows_use_stable_columns_and_flag_gaps() {
        let registry = two_protocol_registry();
        let archive = archive_with(&[(
            "aave",
            Metric::Revenue,
            "aave",
            &[("2023-01-15", Some(100.0)), ("2023-07-15", Some(50.0))],
        )]);

        let report = build(&registry, &archive).unwrap();
        let rows = export_rows(&report.dataset);

        let revenue_row = rows
            .iter()
            .find(|r| r.metric == "revenue" && r.timestamp_or_period == "2023-01-15")
            .unwrap();
        assert_eq!(revenue_row.value, Some(100.0));
        assert!(!revenue_row.is_missing);

        // Q3's prior quarter (Q2) is absent: exported as a flagged gap.
        let gap_row = rows
            .iter()
            .find(|r| r.metric == "qoq_growth" && r.timestamp_or_period == "2023-Q3")
            .unwrap();
        assert_eq!(gap_row.value, None);
        assert!(gap_row.is_missing);
    }

    #[test]
    fn ranking_pins_a_protocol_outside_the_top() {
        let registry = ProtocolRegistry::new(vec![
            ProtocolSpec::new("aave", Chain::Ethereum, &["aave"]),
            ProtocolSpec::new("compound", Chain::Ethereum, &["compound"]),
            ProtocolSpec::new("lido", Chain::Ethereum, &["lido"]),
        ])
        .unwrap();
        let archive = archive_with(&[
            ("aave", Metric::MarketCap, "aave", &[("2023-01-01", Some(300.0))]),
            ("compound", Metric::MarketCap, "compound", &[("2023-01-01", Some(200.0))]),
            ("lido", Metric::MarketCap, "lido", &[("2023-01-01", Some(100.0))]),
        ]);

        let report = build(&registry, &archive).unwrap();
        let top = top_by_market_cap(&report.dataset, 2, Some("lido"));
        assert_eq!(top, vec!["aave", "compound", "lido"]);

        let unpinned = top_by_market_cap(&report.dataset, 2, None);
        assert_eq!(unpinned, vec!["aave", "compound"]);
    }
}
