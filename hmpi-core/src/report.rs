//! Reporting and output generation
//!
//! Global invariants enforced:
//! - Deterministic output ordering
//! - Byte-for-byte identical output across runs

use crate::aggregates::{self, DashboardSummary, GroupStats, MetalStats, RiskBucket};
use crate::alert::AlertDraft;
use crate::analysis::AssessedSample;
use crate::compliance::{self, Compliance, ComplianceSummary, PolicyTally, ThresholdImpact};
use crate::model::{Authority, Project, Standards};
use crate::trends::TrendStats;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Project label used when a sample's project is not known
pub const UNKNOWN_PROJECT: &str = "Unknown";

/// CSV header of the calculation export
pub const CSV_HEADER: &str = "Sample ID,Project,Metal,Si (mg/L),Ii,Mi,HMPI,Risk Level,WHO Standard,BBI Standard,Exceeds WHO,Exceeds BBI,Exceeds Policy";

/// One row of the calculation report
///
/// `None` in a standard or exceedance column means the limit is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CalculationRow {
    pub sample_id: String,
    pub project: String,
    pub metal: String,
    pub si: f64,
    pub ii: f64,
    pub mi: f64,
    pub hmpi: f64,
    pub risk_level: String,
    pub who_standard: Option<f64>,
    pub bbi_standard: Option<f64>,
    pub exceeds_who: Option<bool>,
    pub exceeds_bbi: Option<bool>,
    pub exceeds_policy: Option<bool>,
}

fn exceeds(outcome: Compliance) -> Option<bool> {
    match outcome {
        Compliance::Compliant => Some(false),
        Compliance::Violating => Some(true),
        Compliance::Unknown => None,
    }
}

impl CalculationRow {
    pub fn new(assessed: &AssessedSample, project: Option<&Project>, standards: &Standards) -> Self {
        let sample = &assessed.sample;
        CalculationRow {
            sample_id: sample.sample_id.clone(),
            project: project
                .map(|p| p.short_name().to_string())
                .unwrap_or_else(|| UNKNOWN_PROJECT.to_string()),
            metal: sample.metal.clone(),
            si: sample.si,
            ii: sample.ii,
            mi: sample.mi,
            hmpi: assessed.hmpi,
            risk_level: assessed.risk.as_str().to_string(),
            who_standard: standards.who.limit(&sample.metal),
            bbi_standard: standards.bbi.limit(&sample.metal),
            exceeds_who: exceeds(compliance::check_sample(sample, standards, Authority::Who)),
            exceeds_bbi: exceeds(compliance::check_sample(sample, standards, Authority::Bbi)),
            exceeds_policy: project.map(|p| !compliance::within_policy_threshold(assessed.hmpi, p)),
        }
    }
}

/// Build sorted calculation rows for a batch
pub fn build_rows(
    assessed: &[AssessedSample],
    projects: &[Project],
    standards: &Standards,
) -> Vec<CalculationRow> {
    let by_id: HashMap<&str, &Project> = projects
        .iter()
        .map(|p| (p.project_id.as_str(), p))
        .collect();

    let rows = assessed
        .iter()
        .map(|a| CalculationRow::new(a, by_id.get(a.sample.project_id.as_str()).copied(), standards))
        .collect();
    sort_rows(rows)
}

/// Sort rows deterministically
pub fn sort_rows(mut rows: Vec<CalculationRow>) -> Vec<CalculationRow> {
    rows.sort_by(|a, b| {
        // 1. HMPI descending
        b.hmpi
            .partial_cmp(&a.hmpi)
            .unwrap_or(std::cmp::Ordering::Equal)
            // 2. Sample id ascending
            .then_with(|| a.sample_id.cmp(&b.sample_id))
            // 3. Metal ascending
            .then_with(|| a.metal.cmp(&b.metal))
    });
    rows
}

/// Headline counts of the calculation report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CalculationStats {
    pub total_samples: usize,
    pub average_index: f64,
    pub exceeds_who: usize,
    pub exceeds_bbi: usize,
    pub exceeds_policy: usize,
    pub high_risk: usize,
}

pub fn calculation_stats(rows: &[CalculationRow], assessed: &[AssessedSample]) -> CalculationStats {
    let mut stats = CalculationStats {
        total_samples: rows.len(),
        average_index: aggregates::average_index(assessed),
        high_risk: aggregates::high_risk_count(assessed),
        ..Default::default()
    };
    for row in rows {
        stats.exceeds_who += usize::from(row.exceeds_who == Some(true));
        stats.exceeds_bbi += usize::from(row.exceeds_bbi == Some(true));
        stats.exceeds_policy += usize::from(row.exceeds_policy == Some(true));
    }
    stats
}

fn yes_no(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "Yes",
        Some(false) => "No",
        None => "N/A",
    }
}

fn limit_text(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

/// Quote a CSV field when it contains a separator, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render rows as CSV, header first, `\n` line endings
pub fn render_csv(rows: &[CalculationRow]) -> String {
    let mut output = String::from(CSV_HEADER);
    output.push('\n');
    for row in rows {
        let fields = [
            csv_field(&row.sample_id),
            csv_field(&row.project),
            csv_field(&row.metal),
            row.si.to_string(),
            row.ii.to_string(),
            row.mi.to_string(),
            row.hmpi.to_string(),
            csv_field(&row.risk_level),
            limit_text(row.who_standard),
            limit_text(row.bbi_standard),
            yes_no(row.exceeds_who).to_string(),
            yes_no(row.exceeds_bbi).to_string(),
            yes_no(row.exceeds_policy).to_string(),
        ];
        output.push_str(&fields.join(","));
        output.push('\n');
    }
    output
}

/// Render rows as a text table, at most `top` rows
pub fn render_text(rows: &[CalculationRow], top: Option<usize>) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{:<8} {:<15} {:<12} {:<10} {:<10} {:<15} {:<4} {:<4} {}\n",
        "HMPI", "SAMPLE", "PROJECT", "METAL", "SI", "RISK", "WHO", "BBI", "POLICY"
    ));

    for row in rows.iter().take(top.unwrap_or(usize::MAX)) {
        output.push_str(&format!(
            "{:<8} {:<15} {:<12} {:<10} {:<10} {:<15} {:<4} {:<4} {}\n",
            format!("{:.2}", row.hmpi),
            truncate_or_pad(&row.sample_id, 15),
            truncate_or_pad(&row.project, 12),
            truncate_or_pad(&row.metal, 10),
            format!("{:.3}", row.si),
            row.risk_level,
            yes_no(row.exceeds_who),
            yes_no(row.exceeds_bbi),
            yes_no(row.exceeds_policy),
        ));
    }

    output
}

/// Render any serializable report as pretty JSON
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize report to JSON")
}

/// Compliance view as one JSON document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ComplianceReport {
    pub summary: ComplianceSummary,
    pub policies: Vec<PolicyTally>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_impact: Option<ThresholdImpact>,
}

/// Overview screen as one JSON document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DashboardReport {
    pub summary: DashboardSummary,
    pub risk_distribution: Vec<RiskBucket>,
}

/// Render comparison groups as a text table
pub fn render_comparison_text(stats: &[GroupStats]) -> String {
    let mut output = format!(
        "{:<20} {:>7} {:>9} {:>9} {:>9} {:>10}\n",
        "GROUP", "SAMPLES", "AVG", "MAX", "MIN", "HIGH RISK"
    );
    for group in stats {
        output.push_str(&format!(
            "{:<20} {:>7} {:>9.2} {:>9.2} {:>9.2} {:>10}\n",
            truncate_or_pad(&group.key, 20),
            group.sample_count,
            group.average_index,
            group.max_index,
            group.min_index,
            format!("{}/{} ({:.0}%)", group.high_risk_count, group.sample_count, group.high_risk_percent),
        ));
    }
    output
}

/// Render the metal view: concentration and standard compliance per metal
pub fn render_metal_text(stats: &[MetalStats]) -> String {
    let mut output = format!(
        "{:<12} {:>7} {:>9} {:>10} {:>8} {:>8} {:>8} {:>8}\n",
        "METAL", "SAMPLES", "AVG HMPI", "AVG SI", "WHO", "WHO OK", "BBI", "BBI OK"
    );
    for metal in stats {
        output.push_str(&format!(
            "{:<12} {:>7} {:>9.2} {:>10.4} {:>8} {:>7.1}% {:>8} {:>7.1}%\n",
            truncate_or_pad(&metal.stats.key, 12),
            metal.stats.sample_count,
            metal.stats.average_index,
            metal.average_concentration,
            limit_text(metal.who_limit),
            metal.who.rate(),
            limit_text(metal.bbi_limit),
            metal.bbi.rate(),
        ));
    }
    output
}

/// Render trend statistics and the monthly series
pub fn render_trends_text(stats: &TrendStats) -> String {
    let mut output = format!(
        "Samples: {}  Average HMPI: {:.1}  Trend: {:+.1} ({})  High-risk districts: {}\n\n",
        stats.total_samples,
        stats.average_index,
        stats.trend_delta,
        stats.direction.as_str(),
        stats.high_risk_districts
    );
    output.push_str(&format!("{:<8} {:>7} {:>9}\n", "MONTH", "SAMPLES", "AVG HMPI"));
    for bucket in &stats.series {
        output.push_str(&format!(
            "{:<8} {:>7} {:>9.2}\n",
            bucket.bucket, bucket.count, bucket.average_index
        ));
    }
    output
}

/// Render compliance percentages, policy tallies and an optional threshold impact
pub fn render_compliance_text(report: &ComplianceReport) -> String {
    let summary = &report.summary;
    let policies = &report.policies;
    let mut output = format!("Samples: {}\n", summary.total_samples);
    for (label, tally) in [
        ("WHO", &summary.who),
        ("BBI", &summary.bbi),
        ("Project policy", &summary.policy),
    ] {
        output.push_str(&format!(
            "{:<15} {:>6.1}%  ({} compliant, {} violating, {} unknown)\n",
            label,
            tally.rate(),
            tally.compliant,
            tally.violating,
            tally.unknown
        ));
    }

    if !policies.is_empty() {
        output.push('\n');
        output.push_str(&format!(
            "{:<8} {:<30} {:<10} {:>9} {:>9}\n",
            "POLICY", "NAME", "METAL", "LIMIT", "COMPLIANT"
        ));
        for policy in policies {
            output.push_str(&format!(
                "{:<8} {:<30} {:<10} {:>9} {:>8.1}%\n",
                truncate_or_pad(&policy.policy_id, 8),
                truncate_or_pad(&policy.policy_name, 30),
                truncate_or_pad(&policy.metal, 10),
                policy.threshold,
                policy.tally.rate()
            ));
        }
    }

    if let Some(ref impact) = report.threshold_impact {
        output.push_str(&format!(
            "\nThreshold {}: {} of {} samples affected ({:.1}%)\n",
            impact.threshold, impact.affected_count, impact.total_samples, impact.affected_percent
        ));
    }

    output
}

/// Render alert drafts as a text table
pub fn render_alerts_text(drafts: &[AlertDraft]) -> String {
    let mut output = format!("{:<8} {:<15} {:<10} {}\n", "SEVERITY", "SAMPLE", "PROJECT", "MESSAGE");
    for draft in drafts {
        output.push_str(&format!(
            "{:<8} {:<15} {:<10} {}\n",
            draft.severity.as_str(),
            truncate_or_pad(&draft.sample_id, 15),
            truncate_or_pad(&draft.project_id, 10),
            draft.message
        ));
    }
    output
}

/// Render the overview screen as text
pub fn render_dashboard_text(report: &DashboardReport) -> String {
    let summary = &report.summary;
    let mut output = format!(
        "Projects: {}  Samples: {}  Open alerts: {}  High risk: {}  Average HMPI: {:.1}\n\n",
        summary.total_projects,
        summary.total_samples,
        summary.open_alerts,
        summary.high_risk_samples,
        summary.average_index
    );
    output.push_str(&format!("{:<12} {:<20} {:>7} {:>11}\n", "PROJECT", "NAME", "SAMPLES", "OPEN ALERTS"));
    for project in &summary.projects {
        output.push_str(&format!(
            "{:<12} {:<20} {:>7} {:>11}\n",
            truncate_or_pad(&project.project_id, 12),
            truncate_or_pad(&project.name, 20),
            project.samples,
            project.open_alerts
        ));
    }
    output.push('\n');
    output.push_str(&format!("{:<15} {:>7}\n", "RISK LEVEL", "SAMPLES"));
    for bucket in &report.risk_distribution {
        output.push_str(&format!("{:<15} {:>7}\n", bucket.level.as_str(), bucket.count));
    }
    output
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;
    use crate::risk::classify;
    use chrono::NaiveDate;

    fn assessed(id: &str, project: &str, metal: &str, si: f64, hmpi: f64) -> AssessedSample {
        AssessedSample {
            sample: Sample {
                sample_id: id.to_string(),
                project_id: project.to_string(),
                metal: metal.to_string(),
                si,
                ii: 0.3,
                mi: 0.7,
                latitude: None,
                longitude: None,
                district: None,
                city: None,
                date: NaiveDate::from_ymd_opt(2025, 1, 12).unwrap(),
            },
            hmpi,
            risk: classify(hmpi),
        }
    }

    fn projects() -> Vec<Project> {
        vec![Project {
            project_id: "p1".to_string(),
            name: "Ganga Water Quality Study - Varanasi".to_string(),
            description: String::new(),
            district: "Varanasi".to_string(),
            city: "Varanasi".to_string(),
            policy_threshold_hmpi: 20.0,
        }]
    }

    fn rows() -> Vec<CalculationRow> {
        let batch = vec![
            assessed("GNG-001", "p1", "Lead", 0.09, 21.0),
            assessed("GNG-002", "p1", "Lead", 0.005, 1.17),
            assessed("ZZZ-001", "p9", "Zinc", 0.5, 21.0),
        ];
        build_rows(&batch, &projects(), &Standards::reference())
    }

    #[test]
    fn test_rows_sorted_by_index_then_id() {
        let ids: Vec<String> = rows().into_iter().map(|r| r.sample_id).collect();
        assert_eq!(ids, vec!["GNG-001", "ZZZ-001", "GNG-002"]);
    }

    #[test]
    fn test_row_columns() {
        let rows = rows();
        let lead = &rows[0];
        assert_eq!(lead.project, "Varanasi");
        assert_eq!(lead.who_standard, Some(0.01));
        assert_eq!(lead.exceeds_who, Some(true));
        assert_eq!(lead.exceeds_bbi, Some(true));
        assert_eq!(lead.exceeds_policy, Some(true));
        assert_eq!(lead.risk_level, "Low Risk");

        let zinc = &rows[1];
        assert_eq!(zinc.project, UNKNOWN_PROJECT);
        assert_eq!(zinc.who_standard, None);
        assert_eq!(zinc.exceeds_who, None);
        assert_eq!(zinc.exceeds_policy, None);
    }

    #[test]
    fn test_render_csv() {
        let csv = render_csv(&rows());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "GNG-001,Varanasi,Lead,0.09,0.3,0.7,21,Low Risk,0.01,0.05,Yes,Yes,Yes"
        );
        assert_eq!(
            lines[2],
            "ZZZ-001,Unknown,Zinc,0.5,0.3,0.7,21,Low Risk,N/A,N/A,N/A,N/A,N/A"
        );
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_calculation_stats() {
        let batch = vec![
            assessed("GNG-001", "p1", "Lead", 0.09, 21.0),
            assessed("GNG-002", "p1", "Lead", 0.005, 1.17),
        ];
        let rows = build_rows(&batch, &projects(), &Standards::reference());
        let stats = calculation_stats(&rows, &batch);
        assert_eq!(stats.total_samples, 2);
        assert_eq!(stats.exceeds_who, 1);
        assert_eq!(stats.exceeds_bbi, 1);
        assert_eq!(stats.exceeds_policy, 1);
        assert_eq!(stats.high_risk, 0);
    }

    #[test]
    fn test_render_text_respects_top() {
        let text = render_text(&rows(), Some(1));
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("21.00"));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render_csv(&rows()), render_csv(&rows()));
        assert_eq!(render_json(&rows()).unwrap(), render_json(&rows()).unwrap());
    }

    #[test]
    fn test_render_compliance_text() {
        let summary = ComplianceSummary {
            total_samples: 4,
            who: compliance::ComplianceTally {
                compliant: 1,
                violating: 3,
                unknown: 0,
            },
            ..Default::default()
        };
        let impact = ThresholdImpact {
            threshold: 80.0,
            affected_count: 1,
            total_samples: 4,
            affected_percent: 25.0,
        };
        let report = ComplianceReport {
            summary,
            policies: Vec::new(),
            threshold_impact: Some(impact),
        };
        let text = render_compliance_text(&report);
        assert!(text.contains("WHO"));
        assert!(text.contains("25.0%  (1 compliant, 3 violating, 0 unknown)"));
        assert!(text.contains("Threshold 80: 1 of 4 samples affected (25.0%)"));
    }

    #[test]
    fn test_truncate_or_pad() {
        assert_eq!(truncate_or_pad("abc", 5), "abc  ");
        assert_eq!(truncate_or_pad("abcdefghij", 6), "abc...");
    }
}
