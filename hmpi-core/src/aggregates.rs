//! Aggregation views over assessed samples
//!
//! Computes derived statistics without modifying sample data.
//!
//! Global invariants enforced:
//! - Aggregates are strictly derived (never stored, always computed)
//! - Deterministic ordering (groups sorted by key)
//! - Means over empty collections are 0, never NaN
//! - Accumulation follows input order

use crate::analysis::AssessedSample;
use crate::compliance::{self, ComplianceTally};
use crate::error::{HmpiError, Result};
use crate::model::{Alert, Authority, Project, Standards};
use crate::risk::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label used for samples without a district
pub const UNKNOWN_DISTRICT: &str = "Unknown";

/// Mean index; 0 for an empty collection
pub fn average_index(assessed: &[AssessedSample]) -> f64 {
    strict_average_index(assessed).unwrap_or(0.0)
}

/// Mean index; `EmptyInput` for an empty collection
pub fn strict_average_index(assessed: &[AssessedSample]) -> Result<f64> {
    if assessed.is_empty() {
        return Err(HmpiError::EmptyInput("average index"));
    }
    let sum: f64 = assessed.iter().map(|a| a.hmpi).sum();
    Ok(sum / assessed.len() as f64)
}

/// Count of High and Very High samples
pub fn high_risk_count(assessed: &[AssessedSample]) -> usize {
    assessed.iter().filter(|a| a.risk.is_high_plus()).count()
}

/// Stable partition by key; groups keep input order, keys are sorted
pub fn group_by_key<'a, T, K, F>(items: &'a [T], key_fn: F) -> BTreeMap<K, Vec<&'a T>>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut groups: BTreeMap<K, Vec<&'a T>> = BTreeMap::new();
    for item in items {
        groups.entry(key_fn(item)).or_default().push(item);
    }
    groups
}

/// Samples per risk level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskBucket {
    pub level: RiskLevel,
    pub color: String,
    pub count: usize,
}

/// Distribution over every level, Safe first
pub fn risk_distribution(assessed: &[AssessedSample]) -> Vec<RiskBucket> {
    RiskLevel::ALL
        .iter()
        .map(|level| RiskBucket {
            level: *level,
            color: level.color().to_string(),
            count: assessed.iter().filter(|a| a.risk == *level).count(),
        })
        .collect()
}

/// Dimension for comparison views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Project,
    Metal,
    District,
}

impl GroupBy {
    pub fn key(&self, assessed: &AssessedSample) -> String {
        match self {
            GroupBy::Project => assessed.sample.project_id.clone(),
            GroupBy::Metal => assessed.sample.metal.clone(),
            GroupBy::District => assessed
                .sample
                .district
                .clone()
                .unwrap_or_else(|| UNKNOWN_DISTRICT.to_string()),
        }
    }
}

/// Index statistics for one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupStats {
    pub key: String,
    pub sample_count: usize,
    pub average_index: f64,
    pub max_index: f64,
    pub min_index: f64,
    pub high_risk_count: usize,
    pub high_risk_percent: f64,
}

fn group_stats(key: String, members: &[&AssessedSample]) -> GroupStats {
    let sum: f64 = members.iter().map(|a| a.hmpi).sum();
    let max_index = members
        .iter()
        .map(|a| a.hmpi)
        .fold(f64::NEG_INFINITY, f64::max);
    let min_index = members.iter().map(|a| a.hmpi).fold(f64::INFINITY, f64::min);
    let high = members.iter().filter(|a| a.risk.is_high_plus()).count();

    GroupStats {
        key,
        sample_count: members.len(),
        average_index: sum / members.len() as f64,
        max_index,
        min_index,
        high_risk_count: high,
        high_risk_percent: compliance::percentage(high, members.len()),
    }
}

/// Per-group statistics, sorted by key
pub fn compare_by(assessed: &[AssessedSample], group_by: GroupBy) -> Vec<GroupStats> {
    group_by_key(assessed, |a| group_by.key(a))
        .into_iter()
        .map(|(key, members)| group_stats(key, &members))
        .collect()
}

/// Group with the lowest average index (first by key on ties)
pub fn best_group(stats: &[GroupStats]) -> Option<&GroupStats> {
    stats.iter().fold(None, |best: Option<&GroupStats>, current| match best {
        Some(b) if b.average_index <= current.average_index => Some(b),
        _ => Some(current),
    })
}

/// Group with the highest average index (first by key on ties)
pub fn worst_group(stats: &[GroupStats]) -> Option<&GroupStats> {
    stats.iter().fold(None, |worst: Option<&GroupStats>, current| match worst {
        Some(w) if w.average_index >= current.average_index => Some(w),
        _ => Some(current),
    })
}

/// Metal view: index statistics plus concentration and standard compliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetalStats {
    #[serde(flatten)]
    pub stats: GroupStats,
    pub average_concentration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub who_limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbi_limit: Option<f64>,
    pub who: ComplianceTally,
    pub bbi: ComplianceTally,
}

pub fn compare_metals(assessed: &[AssessedSample], standards: &Standards) -> Vec<MetalStats> {
    group_by_key(assessed, |a| a.sample.metal.clone())
        .into_iter()
        .map(|(metal, members)| {
            let concentration: f64 = members.iter().map(|a| a.sample.si).sum();
            let mut who = ComplianceTally::default();
            let mut bbi = ComplianceTally::default();
            for member in &members {
                who.record(compliance::check_sample(&member.sample, standards, Authority::Who));
                bbi.record(compliance::check_sample(&member.sample, standards, Authority::Bbi));
            }
            MetalStats {
                average_concentration: concentration / members.len() as f64,
                who_limit: standards.who.limit(&metal),
                bbi_limit: standards.bbi.limit(&metal),
                who,
                bbi,
                stats: group_stats(metal, &members),
            }
        })
        .collect()
}

/// Per-project counts for the overview screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProjectOverview {
    pub project_id: String,
    pub name: String,
    pub samples: usize,
    pub open_alerts: usize,
}

/// Totals for the overview screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DashboardSummary {
    pub total_projects: usize,
    pub total_samples: usize,
    pub open_alerts: usize,
    pub high_risk_samples: usize,
    pub average_index: f64,
    pub projects: Vec<ProjectOverview>,
}

/// Overview in project input order; open alerts are unacknowledged ones
pub fn dashboard_summary(
    projects: &[Project],
    assessed: &[AssessedSample],
    alerts: &[Alert],
) -> DashboardSummary {
    let overviews = projects
        .iter()
        .map(|project| ProjectOverview {
            project_id: project.project_id.clone(),
            name: project.short_name().to_string(),
            samples: assessed
                .iter()
                .filter(|a| a.sample.project_id == project.project_id)
                .count(),
            open_alerts: alerts
                .iter()
                .filter(|a| a.project_id == project.project_id && !a.acknowledged)
                .count(),
        })
        .collect();

    DashboardSummary {
        total_projects: projects.len(),
        total_samples: assessed.len(),
        open_alerts: alerts.iter().filter(|a| !a.acknowledged).count(),
        high_risk_samples: high_risk_count(assessed),
        average_index: average_index(assessed),
        projects: overviews,
    }
}
