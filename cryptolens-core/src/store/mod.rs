//! Stage persistence
//!
//! Each pipeline stage reads the previous stage's JSON artifact and writes
//! its own, mirroring the on-disk layout the dashboard has always used:
//!
//! - `data/raw/protocol_data.json` — raw archive (fetch stage)
//! - `data/processed/processed_data.json` — dataset report (process stage)
//! - `visualizations/output/dashboard.json` — chart specs (visualize stage)

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::charts::ChartSpec;
use crate::dataset::DatasetReport;
use crate::errors::{ProcessError, ProcessWarning};
use crate::registry::Metric;
use crate::sources::{decode_raw_points, RawArchive, RawProtocolData};

pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn raw_path(&self) -> PathBuf {
        self.root.join("data/raw/protocol_data.json")
    }

    pub fn processed_path(&self) -> PathBuf {
        self.root.join("data/processed/processed_data.json")
    }

    pub fn charts_path(&self) -> PathBuf {
        self.root.join("visualizations/output/dashboard.json")
    }

    pub fn save_raw(&self, archive: &RawArchive) -> Result<(), ProcessError> {
        self.write_json(&self.raw_path(), archive)
    }

    /// Load the raw archive tolerantly: unknown metric keys are skipped and
    /// malformed points are dropped with warnings, so one bad entry in a
    /// hand-edited archive never blocks the process stage.
    pub fn load_raw(&self) -> Result<(RawArchive, Vec<ProcessWarning>), ProcessError> {
        let value: Value = self.read_json(&self.raw_path())?;
        Ok(decode_raw_archive(&value))
    }

    pub fn save_report(&self, report: &DatasetReport) -> Result<(), ProcessError> {
        self.write_json(&self.processed_path(), report)
    }

    pub fn load_report(&self) -> Result<DatasetReport, ProcessError> {
        self.read_json(&self.processed_path())
    }

    pub fn save_charts(&self, charts: &[ChartSpec]) -> Result<(), ProcessError> {
        self.write_json(&self.charts_path(), &charts)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), ProcessError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ProcessError::Store {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(value).map_err(|source| ProcessError::Serde {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ProcessError::Store {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Wrote {}", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, ProcessError> {
        let contents = fs::read_to_string(path).map_err(|source| ProcessError::Store {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ProcessError::Serde {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn decode_raw_archive(value: &Value) -> (RawArchive, Vec<ProcessWarning>) {
    let fetched_at = value
        .get("fetched_at")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .unwrap_or_else(Utc::now);

    let mut archive = RawArchive::new(fetched_at);
    let mut warnings = Vec::new();

    let Some(protocols) = value.get("protocols").and_then(Value::as_object) else {
        return (archive, warnings);
    };

    for (protocol, protocol_value) in protocols {
        let mut data = RawProtocolData::default();

        let metrics = protocol_value
            .get("by_metric")
            .and_then(Value::as_object);
        for (metric_key, variants_value) in metrics.into_iter().flatten() {
            let Ok(metric) = metric_key.parse::<Metric>() else {
                continue; // unknown metric bucket, not ours to compare
            };
            let Some(variants) = variants_value.as_object() else {
                continue;
            };

            for (variant, points_value) in variants {
                let (points, mut point_warnings) =
                    decode_raw_points(points_value, protocol, variant);
                for warning in &mut point_warnings {
                    warning.metric = Some(metric);
                }
                warnings.append(&mut point_warnings);
                if !points.is_empty() {
                    data.by_metric
                        .entry(metric)
                        .or_default()
                        .insert(variant.clone(), points);
                }
            }
        }

        archive.protocols.insert(protocol.clone(), data);
    }

    (archive, warnings)
}
