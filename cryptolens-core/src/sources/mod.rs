//! Metrics sources
//!
//! The fetch boundary of the pipeline. A source returns raw, per-variant
//! point series for one protocol; everything downstream of this module is
//! pure computation. Fetch failures never abort a run here: a failed
//! variant is simply absent from the raw data and surfaces later as a
//! `NoDataForProtocol` warning.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProcessError, ProcessWarning, WarningReason};
use crate::registry::{Metric, ProtocolSpec};

pub mod defillama;

pub use defillama::DefiLlamaClient;

/// One raw observation from an upstream variant. `value: None` means the
/// upstream reported no data at this date, which is distinct from a true
/// zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
    pub variant: String,
}

/// Raw points keyed by upstream variant id.
pub type VariantSeries = HashMap<String, Vec<RawPoint>>;

/// Everything fetched for one protocol, keyed by metric.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProtocolData {
    pub by_metric: HashMap<Metric, VariantSeries>,
}

impl RawProtocolData {
    pub fn is_empty(&self) -> bool {
        self.by_metric.values().all(|vs| vs.values().all(|p| p.is_empty()))
    }
}

/// The fetch stage artifact: one snapshot of raw upstream data for the
/// whole registry. Protocols are keyed by canonical name; a BTreeMap keeps
/// the serialized form stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArchive {
    pub fetched_at: DateTime<Utc>,
    pub protocols: std::collections::BTreeMap<String, RawProtocolData>,
}

impl RawArchive {
    pub fn new(fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            protocols: Default::default(),
        }
    }
}

/// Result of fetching one protocol: the raw data plus any per-variant
/// warnings (failed or empty variants).
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub data: RawProtocolData,
    pub warnings: Vec<ProcessWarning>,
}

#[async_trait::async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch all four metrics for one protocol, merging nothing: each
    /// upstream variant keeps its own point series.
    async fn fetch_protocol(&self, spec: &ProtocolSpec) -> Result<FetchOutcome, ProcessError>;
}

/// Tolerant decoder for the raw input boundary:
/// `[{"date": "2023-01-01", "value": 100.0}, ...]`.
///
/// Dates may be ISO-8601 strings or unix-second numbers. Values may be
/// numbers, numeric strings (coerced), or null (kept as explicitly-missing).
/// A point with an unparsable date or a non-numeric, non-null value is
/// dropped with a `MalformedPoint` warning; the rest of the series is still
/// used.
pub fn decode_raw_points(
    raw: &Value,
    protocol: &str,
    variant: &str,
) -> (Vec<RawPoint>, Vec<ProcessWarning>) {
    let mut points = Vec::new();
    let mut warnings = Vec::new();

    let Some(entries) = raw.as_array() else {
        if !raw.is_null() {
            warnings.push(malformed(
                protocol,
                variant,
                format!("expected an array of points, got {raw}"),
            ));
        }
        return (points, warnings);
    };

    for entry in entries {
        let date = match decode_date(entry.get("date")) {
            Some(date) => date,
            None => {
                warnings.push(malformed(protocol, variant, format!("unparsable date in {entry}")));
                continue;
            }
        };

        let value = match entry.get("value") {
            None | Some(Value::Null) => None,
            Some(v) => match decode_number(v) {
                Some(n) => Some(n),
                None => {
                    warnings.push(malformed(
                        protocol,
                        variant,
                        format!("non-numeric value in {entry}"),
                    ));
                    continue;
                }
            },
        };

        points.push(RawPoint {
            date,
            value,
            variant: variant.to_string(),
        });
    }

    (points, warnings)
}

fn malformed(protocol: &str, variant: &str, detail: String) -> ProcessWarning {
    ProcessWarning {
        protocol: protocol.to_string(),
        metric: None,
        reason: WarningReason::MalformedPoint {
            variant: variant.to_string(),
            detail,
        },
    }
}

fn decode_date(value: Option<&Value>) -> Option<NaiveDate> {
    match value? {
        Value::String(s) => s.parse::<NaiveDate>().ok(),
        Value::Number(n) => {
            let secs = n.as_i64()?;
            DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.date_naive())
        }
        _ => None,
    }
}

fn decode_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        // Upstream occasionally reports numbers as strings.
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}
