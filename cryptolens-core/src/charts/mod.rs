//! Chart-ready specs
//!
//! The renderer is an external consumer; this module only shapes the
//! dataset into comparison bar charts. Bars follow dataset (= registry)
//! order, and a protocol without data for a chart gets a `None` point so
//! the renderer draws a gap instead of a made-up value.

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::processing::MonthlyRevenue;
use crate::registry::Metric;

const MILLION: f64 = 1e6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub y_label: String,
    pub points: Vec<ChartPoint>,
}

/// Build the full comparison dashboard: market cap, annual revenue
/// (trailing 12 months), QoQ revenue growth, TVL and lifetime fees.
pub fn build_dashboard(dataset: &Dataset) -> Vec<ChartSpec> {
    vec![
        comparison_chart(dataset, "Market Cap Comparison", "Market Cap (Millions USD)", |m| {
            m.series(Metric::MarketCap)
                .and_then(|s| s.latest())
                .map(|p| p.value / MILLION)
        }),
        comparison_chart(
            dataset,
            "Annual Revenue Comparison",
            "Annual Revenue (Millions USD)",
            |m| trailing_12_months(&m.monthly_revenue).map(|v| v / MILLION),
        ),
        comparison_chart(
            dataset,
            "QoQ Revenue Growth Comparison",
            "QoQ Revenue Growth (%)",
            |m| {
                m.qoq_growth
                    .last()
                    .and_then(|g| g.value)
                    .map(|v| v * 100.0)
            },
        ),
        comparison_chart(
            dataset,
            "Total Value Locked (TVL) Comparison",
            "TVL (Millions USD)",
            |m| {
                m.series(Metric::Tvl)
                    .and_then(|s| s.latest())
                    .map(|p| p.value / MILLION)
            },
        ),
        comparison_chart(dataset, "Protocol Fees Comparison", "Fees (Millions USD)", |m| {
            m.series(Metric::Fees)
                .map(|s| s.points.iter().map(|p| p.value).sum::<f64>() / MILLION)
        }),
    ]
}

fn comparison_chart(
    dataset: &Dataset,
    title: &str,
    y_label: &str,
    value: impl Fn(&crate::dataset::ProtocolMetrics) -> Option<f64>,
) -> ChartSpec {
    let points = dataset
        .protocols
        .iter()
        .map(|protocol| ChartPoint {
            label: protocol.clone(),
            value: dataset.metrics.get(protocol).and_then(&value),
        })
        .collect();

    ChartSpec {
        title: title.to_string(),
        y_label: y_label.to_string(),
        points,
    }
}

/// Sum of the most recent 12 monthly buckets. `None` when there is no
/// monthly data at all.
fn trailing_12_months(monthly: &[MonthlyRevenue]) -> Option<f64> {
    if monthly.is_empty() {
        return None;
    }
    let start = monthly.len().saturating_sub(12);
    Some(monthly[start..].iter().map(|m| m.value).sum())
}
