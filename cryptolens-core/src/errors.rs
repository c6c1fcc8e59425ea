//! Pipeline error types

use std::path::PathBuf;

use thiserror::Error;

use crate::registry::Metric;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("Invalid protocol spec: {0}")]
    InvalidSpec(String),

    #[error("No data for protocol {protocol} (metric: {metric})")]
    NoDataForProtocol { protocol: String, metric: Metric },

    #[error("Dataset is empty: no protocol produced any usable data")]
    EmptyDataset,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error at {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A recoverable problem downgraded at the dataset boundary. Warnings are
/// collected and returned alongside the dataset so callers and tests can
/// assert on which protocols were excluded and why, rather than grepping
/// logs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProcessWarning {
    pub protocol: String,
    pub metric: Option<Metric>,
    pub reason: WarningReason,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningReason {
    /// Upstream returned nothing usable for this protocol/metric.
    NoData,
    /// A single raw point had an unparsable date or non-numeric value and
    /// was dropped; the rest of the series was still processed.
    MalformedPoint { variant: String, detail: String },
    /// The fetch layer failed for one upstream variant.
    FetchFailed { variant: String, detail: String },
}

impl std::fmt::Display for ProcessWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            WarningReason::NoData => write!(
                f,
                "{}: no upstream data{}",
                self.protocol,
                self.metric
                    .map(|m| format!(" for {m}"))
                    .unwrap_or_default()
            ),
            WarningReason::MalformedPoint { variant, detail } => write!(
                f,
                "{}: dropped malformed point from {variant}: {detail}",
                self.protocol
            ),
            WarningReason::FetchFailed { variant, detail } => {
                write!(f, "{}: fetch failed for {variant}: {detail}", self.protocol)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Downgraded to a warning at the dataset boundary.
    Recoverable,
    /// Aborts the run.
    Fatal,
}

impl ProcessError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NoDataForProtocol { .. } | Self::Http(_) => ErrorSeverity::Recoverable,
            Self::UnknownProtocol(_)
            | Self::InvalidSpec(_)
            | Self::EmptyDataset
            | Self::Store { .. }
            | Self::Serde { .. } => ErrorSeverity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.severity(), ErrorSeverity::Fatal)
    }
}
