//! DeFiLlama API client
//!
//! Talks to the public `api.llama.fi` endpoints:
//! - `/protocol/{id}` for the TVL history and market cap
//! - `/summary/fees/{id}?dataType=dailyFees|dailyRevenue` for fee/revenue
//!   daily charts
//!
//! Each upstream variant is fetched independently; a failed variant becomes
//! a `FetchFailed` warning and an absent series, never an aborted run.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{ProcessError, ProcessWarning, WarningReason};
use crate::registry::{Metric, ProtocolSpec};

use super::{decode_number, FetchOutcome, MetricsSource, RawPoint, RawProtocolData};

const BASE_URL: &str = "https://api.llama.fi";
const USER_AGENT: &str = "cryptolens/0.1";

pub struct DefiLlamaClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ProtocolResponse {
    #[allow(dead_code)]
    name: Option<String>,
    mcap: Option<f64>,
    #[serde(default)]
    tvl: Vec<TvlEntry>,
}

#[derive(Debug, Deserialize)]
struct TvlEntry {
    date: i64,
    #[serde(rename = "totalLiquidityUSD")]
    total_liquidity_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FeesSummaryResponse {
    #[serde(rename = "totalDataChart", default)]
    total_data_chart: Vec<(i64, Value)>,
}

impl DefiLlamaClient {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    /// Point the client at a different host (tests, mirrors).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProcessError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching {url}");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    async fn fetch_variant(
        &self,
        spec: &ProtocolSpec,
        variant: &str,
        fetched_at: DateTime<Utc>,
        data: &mut RawProtocolData,
        warnings: &mut Vec<ProcessWarning>,
    ) {
        let protocol = match self
            .get_json::<ProtocolResponse>(&format!("/protocol/{variant}"))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Fetch failed for {variant}: {e}");
                warnings.push(ProcessWarning {
                    protocol: spec.canonical_name.clone(),
                    metric: None,
                    reason: WarningReason::FetchFailed {
                        variant: variant.to_string(),
                        detail: e.to_string(),
                    },
                });
                return;
            }
        };

        let tvl_points = tvl_points(&protocol, variant);
        if !tvl_points.is_empty() {
            data.by_metric
                .entry(Metric::Tvl)
                .or_default()
                .insert(variant.to_string(), tvl_points);
        }

        // Market cap is a scalar on this endpoint; store it as a
        // single-point series stamped with the fetch date so all four
        // metrics flow through the same normalization path.
        if let Some(mcap) = protocol.mcap {
            data.by_metric.entry(Metric::MarketCap).or_default().insert(
                variant.to_string(),
                vec![RawPoint {
                    date: fetched_at.date_naive(),
                    value: Some(mcap),
                    variant: variant.to_string(),
                }],
            );
        }

        for (metric, data_type) in [(Metric::Fees, "dailyFees"), (Metric::Revenue, "dailyRevenue")]
        {
            match self
                .get_json::<FeesSummaryResponse>(&format!(
                    "/summary/fees/{variant}?dataType={data_type}"
                ))
                .await
            {
                Ok(resp) => {
                    let points = chart_points(&resp.total_data_chart, variant);
                    if !points.is_empty() {
                        data.by_metric
                            .entry(metric)
                            .or_default()
                            .insert(variant.to_string(), points);
                    }
                }
                Err(e) => {
                    warn!("Fetch failed for {variant} {data_type}: {e}");
                    warnings.push(ProcessWarning {
                        protocol: spec.canonical_name.clone(),
                        metric: Some(metric),
                        reason: WarningReason::FetchFailed {
                            variant: variant.to_string(),
                            detail: e.to_string(),
                        },
                    });
                }
            }
        }
    }
}

impl Default for DefiLlamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MetricsSource for DefiLlamaClient {
    async fn fetch_protocol(&self, spec: &ProtocolSpec) -> Result<FetchOutcome, ProcessError> {
        let fetched_at = Utc::now();
        let mut outcome = FetchOutcome::default();

        for variant in &spec.upstream_ids {
            self.fetch_variant(
                spec,
                variant,
                fetched_at,
                &mut outcome.data,
                &mut outcome.warnings,
            )
            .await;
        }

        Ok(outcome)
    }
}

fn tvl_points(protocol: &ProtocolResponse, variant: &str) -> Vec<RawPoint> {
    protocol
        .tvl
        .iter()
        .filter_map(|entry| {
            let date = DateTime::<Utc>::from_timestamp(entry.date, 0)?.date_naive();
            Some(RawPoint {
                date,
                value: entry.total_liquidity_usd,
                variant: variant.to_string(),
            })
        })
        .collect()
}

fn chart_points(chart: &[(i64, Value)], variant: &str) -> Vec<RawPoint> {
    chart
        .iter()
        .filter_map(|(ts, value)| {
            let date = DateTime::<Utc>::from_timestamp(*ts, 0)?.date_naive();
            Some(RawPoint {
                date,
                // Non-numeric chart entries are treated as absent data.
                value: decode_number(value),
                variant: variant.to_string(),
            })
        })
        .collect()
}
