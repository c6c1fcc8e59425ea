//! Calendar-bucketed aggregates
//!
//! Pure functions over a normalized series. Buckets only ever contain
//! dates the series actually has; an empty bucket is omitted rather than
//! emitted as zero, and quarter-over-quarter growth is flagged as
//! uncomputable (never divided through zero, never NaN) when the prior
//! quarter is absent or zero.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::NormalizedSeries;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Quarter {
    pub year: i32,
    /// 1..=4
    pub quarter: u8,
}

impl Quarter {
    pub fn from_date(date: chrono::NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: ((date.month0() / 3) + 1) as u8,
        }
    }

    /// The immediately preceding calendar quarter.
    pub fn prev(&self) -> Self {
        if self.quarter == 1 {
            Self { year: self.year - 1, quarter: 4 }
        } else {
            Self { year: self.year, quarter: self.quarter - 1 }
        }
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualRevenue {
    pub protocol: String,
    pub year: i32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    pub protocol: String,
    /// "YYYY-MM"
    pub month: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QoqGrowth {
    pub protocol: String,
    pub quarter: Quarter,
    /// Relative growth vs. the prior quarter, e.g. -1.0 for -100%.
    /// `None` whenever the prior quarter is absent or zero.
    pub value: Option<f64>,
    pub prior_quarter_value_missing: bool,
}

/// Sum of present points per calendar year, ascending. Years without a
/// single point are omitted.
pub fn annual_revenue(series: &NormalizedSeries) -> Vec<AnnualRevenue> {
    let mut by_year: BTreeMap<i32, f64> = BTreeMap::new();
    for point in &series.points {
        *by_year.entry(point.date.year()).or_insert(0.0) += point.value;
    }

    by_year
        .into_iter()
        .map(|(year, value)| AnnualRevenue {
            protocol: series.protocol.clone(),
            year,
            value,
        })
        .collect()
}

/// Sum of present points per calendar month, ascending.
pub fn monthly_revenue(series: &NormalizedSeries) -> Vec<MonthlyRevenue> {
    let mut by_month: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for point in &series.points {
        *by_month
            .entry((point.date.year(), point.date.month()))
            .or_insert(0.0) += point.value;
    }

    by_month
        .into_iter()
        .map(|((year, month), value)| MonthlyRevenue {
            protocol: series.protocol.clone(),
            month: format!("{year}-{month:02}"),
            value,
        })
        .collect()
}

/// Quarter-over-quarter growth, chronological.
///
/// Growth for quarter Q is `(v(Q) - v(P)) / v(P)` where P is the
/// immediately preceding calendar quarter. When P is absent from the
/// bucketed series, or `v(P) == 0`, the record is emitted with
/// `prior_quarter_value_missing = true` and no numeric value: downstream
/// charting renders a gap instead of a fabricated number. The first quarter
/// of any series is flagged the same way, not treated as an error.
pub fn qoq_growth(series: &NormalizedSeries) -> Vec<QoqGrowth> {
    let mut by_quarter: BTreeMap<Quarter, f64> = BTreeMap::new();
    for point in &series.points {
        *by_quarter.entry(Quarter::from_date(point.date)).or_insert(0.0) += point.value;
    }

    by_quarter
        .iter()
        .map(|(&quarter, &value)| {
            let prior = by_quarter.get(&quarter.prev()).copied();
            match prior {
                Some(prior_value) if prior_value != 0.0 => QoqGrowth {
                    protocol: series.protocol.clone(),
                    quarter,
                    value: Some((value - prior_value) / prior_value),
                    prior_quarter_value_missing: false,
                },
                _ => QoqGrowth {
                    protocol: series.protocol.clone(),
                    quarter,
                    value: None,
                    prior_quarter_value_missing: true,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::SeriesPoint;
    use crate::registry::Metric;

    fn series(points: &[(&str, f64)]) -> NormalizedSeries {
        NormalizedSeries {
            protocol: "aave".to_string(),
            metric: Metric::Revenue,
            points: points
                .iter()
                .map(|(date, value)| SeriesPoint {
                    date: date.parse().unwrap(),
                    value: *value,
                })
                .collect(),
        }
    }

    #[test]
    fn annual_revenue_buckets_by_calendar_year() {
        let s = series(&[
            ("2022-12-31", 10.0),
            ("2023-01-01", 1.0),
            ("2023-06-15", 2.0),
        ]);
        let annual = annual_revenue(&s);
        assert_eq!(annual.len(), 2);
        assert_eq!(annual[0].year, 2022);
        assert_eq!(annual[0].value, 10.0);
        assert_eq!(annual[1].year, 2023);
        assert_eq!(annual[1].value, 3.0);
    }

    #[test]
    fn empty_years_are_omitted() {
        // 2022 and 2024 have points, 2023 has none: no zero-valued 2023 row.
        let s = series(&[("2022-06-01", 5.0), ("2024-06-01", 7.0)]);
        let years: Vec<i32> = annual_revenue(&s).iter().map(|a| a.year).collect();
        assert_eq!(years, vec![2022, 2024]);
    }

    #[test]
    fn monthly_revenue_buckets_by_calendar_month() {
        let s = series(&[
            ("2023-01-01", 1.0),
            ("2023-01-15", 2.0),
            ("2023-02-01", 4.0),
        ]);
        let monthly = monthly_revenue(&s);
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].month, "2023-01");
        assert_eq!(monthly[0].value, 3.0);
        assert_eq!(monthly[1].month, "2023-02");
    }

    #[test]
    fn qoq_growth_flags_zero_prior_quarter() {
        // Q1=1000, Q2=0, Q3=500. Q2 growth is computable (-1.0) because Q1
        // is present and non-zero; Q3 must be flagged since Q2 is zero.
        let s = series(&[
            ("2023-01-15", 1000.0),
            ("2023-04-15", 0.0),
            ("2023-07-15", 500.0),
        ]);
        let growth = qoq_growth(&s);
        assert_eq!(growth.len(), 3);

        assert!(growth[0].prior_quarter_value_missing); // no Q4-2022
        assert_eq!(growth[0].value, None);

        assert!(!growth[1].prior_quarter_value_missing);
        assert_eq!(growth[1].value, Some(-1.0));

        assert!(growth[2].prior_quarter_value_missing);
        assert_eq!(growth[2].value, None);
    }

    #[test]
    fn qoq_growth_flags_gap_quarters() {
        // Q1-2023 and Q3-2023: Q3's prior (Q2) is absent, so flagged.
        let s = series(&[("2023-01-15", 100.0), ("2023-07-15", 200.0)]);
        let growth = qoq_growth(&s);
        assert_eq!(growth.len(), 2);
        assert!(growth[1].prior_quarter_value_missing);
        assert_eq!(growth[1].value, None);
    }

    #[test]
    fn qoq_growth_crosses_year_boundary() {
        let s = series(&[("2022-11-15", 100.0), ("2023-02-15", 150.0)]);
        let growth = qoq_growth(&s);
        assert_eq!(growth[1].quarter, Quarter { year: 2023, quarter: 1 });
        assert_eq!(growth[1].value, Some(0.5));
    }

    #[test]
    fn qoq_growth_never_nan_or_infinite() {
        let s = series(&[
            ("2023-01-15", 0.0),
            ("2023-04-15", 0.0),
            ("2023-07-15", 10.0),
        ]);
        for record in qoq_growth(&s) {
            if let Some(v) = record.value {
                assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn aggregation_is_idempotent() {
        let s = series(&[
            ("2023-01-15", 1000.0),
            ("2023-04-15", 0.0),
            ("2023-07-15", 500.0),
        ]);
        assert_eq!(annual_revenue(&s), annual_revenue(&s));
        assert_eq!(monthly_revenue(&s), monthly_revenue(&s));
        assert_eq!(qoq_growth(&s), qoq_growth(&s));
    }

    #[test]
    fn quarter_prev_and_display() {
        let q1 = Quarter { year: 2023, quarter: 1 };
        assert_eq!(q1.prev(), Quarter { year: 2022, quarter: 4 });
        assert_eq!(q1.to_string(), "2023-Q1");
        assert_eq!(
            Quarter::from_date("2023-06-30".parse().unwrap()),
            Quarter { year: 2023, quarter: 2 }
        );
    }
}
