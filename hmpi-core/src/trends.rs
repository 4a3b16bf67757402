//! Trend semantics - index development over collection time
//!
//! Global invariants enforced:
//! - Deterministic ordering (buckets ascending, samples stable-sorted by date)
//! - Bucket means are sum / count, divided once per bucket
//! - Trends are derived, not stored

use crate::aggregates;
use crate::analysis::AssessedSample;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Flat trend tolerance (epsilon)
const FLAT_TREND_EPSILON: f64 = 1e-9;

/// Year-month bucket, `YYYY-MM`
pub fn month_bucket(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Mean index for one time bucket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TimeBucket {
    pub bucket: String,
    pub average_index: f64,
    pub count: usize,
}

/// Bucketed mean index, buckets in ascending key order
///
/// Samples are stable-sorted by date before accumulation so the result does
/// not depend on input order beyond ties within one date.
pub fn time_series<F>(assessed: &[AssessedSample], bucket_fn: F) -> Vec<TimeBucket>
where
    F: Fn(NaiveDate) -> String,
{
    let mut ordered: Vec<&AssessedSample> = assessed.iter().collect();
    ordered.sort_by_key(|a| a.sample.date);

    let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for item in ordered {
        let entry = totals.entry(bucket_fn(item.sample.date)).or_insert((0.0, 0));
        entry.0 += item.hmpi;
        entry.1 += 1;
    }

    totals
        .into_iter()
        .map(|(bucket, (sum, count))| TimeBucket {
            bucket,
            average_index: sum / count as f64,
            count,
        })
        .collect()
}

/// Last bucket mean minus first; 0 with fewer than two buckets
pub fn trend_delta(series: &[TimeBucket]) -> f64 {
    match (series.first(), series.last()) {
        (Some(first), Some(last)) if series.len() >= 2 => {
            last.average_index - first.average_index
        }
        _ => 0.0,
    }
}

/// Direction of index movement; a falling index is an improvement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Worsening,
    Flat,
}

impl TrendDirection {
    pub fn from_delta(delta: f64) -> Self {
        if delta.abs() < FLAT_TREND_EPSILON {
            TrendDirection::Flat
        } else if delta > 0.0 {
            TrendDirection::Worsening
        } else {
            TrendDirection::Improving
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Worsening => "worsening",
            TrendDirection::Flat => "flat",
        }
    }
}

/// Headline trend figures plus the series they were derived from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TrendStats {
    pub total_samples: usize,
    pub average_index: f64,
    pub trend_delta: f64,
    pub direction: TrendDirection,
    /// Distinct districts with at least one High or Very High sample
    pub high_risk_districts: usize,
    pub series: Vec<TimeBucket>,
}

impl TrendStats {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize trend statistics to JSON")
    }
}

/// Trend statistics with monthly buckets
pub fn trend_stats(assessed: &[AssessedSample]) -> TrendStats {
    let series = time_series(assessed, month_bucket);
    let delta = trend_delta(&series);

    let high_risk_districts: BTreeSet<String> = assessed
        .iter()
        .filter(|a| a.risk.is_high_plus())
        .map(|a| aggregates::GroupBy::District.key(a))
        .collect();

    TrendStats {
        total_samples: assessed.len(),
        average_index: aggregates::average_index(assessed),
        trend_delta: delta,
        direction: TrendDirection::from_delta(delta),
        high_risk_districts: high_risk_districts.len(),
        series,
    }
}
