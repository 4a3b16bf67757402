//! Compliance against reference standards and policy thresholds
//!
//! Global invariants enforced:
//! - Compliance is non-strict: a value equal to its limit is compliant
//! - A metal missing from a standard is never silently compliant or violating
//! - Rates over empty collections are 0, never NaN

use crate::analysis::AssessedSample;
use crate::error::Result;
use crate::model::{Authority, Policy, Project, Sample, Standards};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `concentration <= limit`
pub fn is_compliant(concentration: f64, limit: f64) -> bool {
    concentration <= limit
}

/// Whether a sample's index stays within its project's HMPI ceiling
pub fn within_policy_threshold(hmpi: f64, project: &Project) -> bool {
    is_compliant(hmpi, project.policy_threshold_hmpi)
}

/// Percentage `part / whole * 100`, 0 for an empty whole
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Tri-state result of a standard lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compliance {
    Compliant,
    Violating,
    /// The metal has no entry in the standard
    Unknown,
}

/// Check one sample's concentration against one authority's table
pub fn check_sample(sample: &Sample, standards: &Standards, authority: Authority) -> Compliance {
    match standards.table(authority).limit(&sample.metal) {
        Some(limit) if is_compliant(sample.si, limit) => Compliance::Compliant,
        Some(_) => Compliance::Violating,
        None => Compliance::Unknown,
    }
}

/// Percentage of samples compliant with an authority's metal limits
///
/// Fails fast with `MissingStandard` on the first metal absent from the table.
/// An empty collection yields 0.
pub fn compliance_rate(
    samples: &[Sample],
    standards: &Standards,
    authority: Authority,
) -> Result<f64> {
    let mut compliant = 0;
    for sample in samples {
        let limit = standards.limit(authority, &sample.metal)?;
        if is_compliant(sample.si, limit) {
            compliant += 1;
        }
    }
    Ok(percentage(compliant, samples.len()))
}

/// Compliant / violating / unknown tallies for one check
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComplianceTally {
    pub compliant: usize,
    pub violating: usize,
    pub unknown: usize,
}

impl ComplianceTally {
    pub(crate) fn record(&mut self, outcome: Compliance) {
        match outcome {
            Compliance::Compliant => self.compliant += 1,
            Compliance::Violating => self.violating += 1,
            Compliance::Unknown => self.unknown += 1,
        }
    }

    /// Compliant share of the decidable samples (unknowns excluded)
    pub fn rate(&self) -> f64 {
        percentage(self.compliant, self.compliant + self.violating)
    }
}

/// WHO, BBI and project-policy compliance over a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComplianceSummary {
    pub total_samples: usize,
    pub who: ComplianceTally,
    pub bbi: ComplianceTally,
    /// Unknown here means the sample's project was not supplied
    pub policy: ComplianceTally,
}

pub fn compliance_summary(
    assessed: &[AssessedSample],
    standards: &Standards,
    projects: &[Project],
) -> ComplianceSummary {
    let by_id: HashMap<&str, &Project> = projects
        .iter()
        .map(|p| (p.project_id.as_str(), p))
        .collect();

    let mut summary = ComplianceSummary {
        total_samples: assessed.len(),
        ..Default::default()
    };

    for item in assessed {
        summary
            .who
            .record(check_sample(&item.sample, standards, Authority::Who));
        summary
            .bbi
            .record(check_sample(&item.sample, standards, Authority::Bbi));

        let policy = match by_id.get(item.sample.project_id.as_str()) {
            Some(project) if within_policy_threshold(item.hmpi, project) => Compliance::Compliant,
            Some(_) => Compliance::Violating,
            None => Compliance::Unknown,
        };
        summary.policy.record(policy);
    }

    summary
}

/// Effect of a proposed project HMPI threshold on a batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ThresholdImpact {
    pub threshold: f64,
    pub affected_count: usize,
    pub total_samples: usize,
    pub affected_percent: f64,
}

/// Count samples whose index strictly exceeds `threshold`
pub fn threshold_impact(assessed: &[AssessedSample], threshold: f64) -> ThresholdImpact {
    let affected_count = assessed.iter().filter(|a| a.hmpi > threshold).count();
    ThresholdImpact {
        threshold,
        affected_count,
        total_samples: assessed.len(),
        affected_percent: percentage(affected_count, assessed.len()),
    }
}

/// Outcome of one metal-specific policy check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PolicyCheck {
    pub policy_id: String,
    pub policy_name: String,
    pub threshold: f64,
    pub compliant: bool,
}

/// Check a sample against every policy covering its metal, in policy order
pub fn metal_policy_compliance(sample: &Sample, policies: &[Policy]) -> Vec<PolicyCheck> {
    policies
        .iter()
        .filter(|policy| policy.metal == sample.metal)
        .map(|policy| PolicyCheck {
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            threshold: policy.threshold,
            compliant: is_compliant(sample.si, policy.threshold),
        })
        .collect()
}

/// Batch outcome of one metal-specific policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PolicyTally {
    pub policy_id: String,
    pub policy_name: String,
    pub metal: String,
    pub threshold: f64,
    pub tally: ComplianceTally,
}

/// Tally every policy over the samples of its metal, in policy order
pub fn policy_tallies(samples: &[Sample], policies: &[Policy]) -> Vec<PolicyTally> {
    let mut tallies: Vec<PolicyTally> = policies
        .iter()
        .map(|policy| PolicyTally {
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            metal: policy.metal.clone(),
            threshold: policy.threshold,
            tally: ComplianceTally::default(),
        })
        .collect();

    for sample in samples {
        for check in metal_policy_compliance(sample, policies) {
            if let Some(entry) = tallies.iter_mut().find(|t| t.policy_id == check.policy_id) {
                entry.tally.record(if check.compliant {
                    Compliance::Compliant
                } else {
                    Compliance::Violating
                });
            }
        }
    }

    tallies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HmpiError;
    use crate::risk::RiskLevel;
    use chrono::NaiveDate;

    fn sample(id: &str, project: &str, metal: &str, si: f64) -> Sample {
        Sample {
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
        }
    }

    fn assessed(sample: Sample, hmpi: f64) -> AssessedSample {
        AssessedSample {
            sample,
            hmpi,
            risk: RiskLevel::Safe,
        }
    }

    fn project(id: &str, threshold: f64) -> Project {
        Project {
            project_id: id.to_string(),
            name: format!("Study - {}", id),
            description: String::new(),
            district: "Varanasi".to_string(),
            city: "Varanasi".to_string(),
            policy_threshold_hmpi: threshold,
        }
    }

    #[test]
    fn test_equality_is_compliant() {
        assert!(is_compliant(0.01, 0.01));
        assert!(!is_compliant(0.011, 0.01));
        assert!(is_compliant(0.0, 0.01));
    }

    #[test]
    fn test_policy_threshold_uses_index() {
        let p = project("p1", 100.0);
        assert!(within_policy_threshold(100.0, &p));
        assert!(!within_policy_threshold(100.01, &p));
    }

    #[test]
    fn test_check_sample_tri_state() {
        let standards = Standards::reference();
        assert_eq!(
            check_sample(&sample("s1", "p1", "Lead", 0.01), &standards, Authority::Who),
            Compliance::Compliant
        );
        assert_eq!(
            check_sample(&sample("s1", "p1", "Lead", 0.09), &standards, Authority::Who),
            Compliance::Violating
        );
        assert_eq!(
            check_sample(&sample("s1", "p1", "Zinc", 0.09), &standards, Authority::Who),
            Compliance::Unknown
        );
    }

    #[test]
    fn test_compliance_rate() {
        let standards = Standards::reference();
        let samples = vec![
            sample("s1", "p1", "Lead", 0.005),
            sample("s2", "p1", "Lead", 0.09),
            sample("s3", "p1", "Arsenic", 0.01),
            sample("s4", "p1", "Cadmium", 0.008),
        ];
        let rate = compliance_rate(&samples, &standards, Authority::Who).unwrap();
        assert_eq!(rate, 50.0);
    }

    #[test]
    fn test_compliance_rate_empty_is_zero() {
        let rate = compliance_rate(&[], &Standards::reference(), Authority::Bbi).unwrap();
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn test_compliance_rate_fails_on_unknown_metal() {
        let samples = vec![sample("s1", "p1", "Lead", 0.005), sample("s2", "p1", "Zinc", 1.0)];
        let err = compliance_rate(&samples, &Standards::reference(), Authority::Who).unwrap_err();
        assert!(matches!(err, HmpiError::MissingStandard { ref metal, .. } if metal == "Zinc"));
    }

    #[test]
    fn test_compliance_summary() {
        let standards = Standards::reference();
        let projects = vec![project("p1", 20.0)];
        let batch = vec![
            assessed(sample("s1", "p1", "Lead", 0.09), 21.0),
            assessed(sample("s2", "p1", "Lead", 0.005), 1.17),
            assessed(sample("s3", "p9", "Zinc", 0.5), 5.0),
        ];
        let summary = compliance_summary(&batch, &standards, &projects);

        assert_eq!(summary.total_samples, 3);
        assert_eq!(summary.who.compliant, 1);
        assert_eq!(summary.who.violating, 1);
        assert_eq!(summary.who.unknown, 1);
        assert_eq!(summary.who.rate(), 50.0);
        assert_eq!(summary.bbi.compliant, 1);
        assert_eq!(summary.bbi.violating, 1);
        assert_eq!(summary.policy.compliant, 1);
        assert_eq!(summary.policy.violating, 1);
        assert_eq!(summary.policy.unknown, 1);
    }

    #[test]
    fn test_tally_rate_without_decidable_samples() {
        let tally = ComplianceTally {
            compliant: 0,
            violating: 0,
            unknown: 4,
        };
        assert_eq!(tally.rate(), 0.0);
    }

    #[test]
    fn test_threshold_impact() {
        let batch = vec![
            assessed(sample("s1", "p1", "Lead", 0.09), 21.0),
            assessed(sample("s2", "p1", "Lead", 0.15), 30.0),
            assessed(sample("s3", "p1", "Lead", 0.2), 80.0),
            assessed(sample("s4", "p1", "Lead", 0.4), 100.0),
        ];
        let impact = threshold_impact(&batch, 30.0);
        assert_eq!(impact.affected_count, 2);
        assert_eq!(impact.total_samples, 4);
        assert_eq!(impact.affected_percent, 50.0);

        let empty = threshold_impact(&[], 30.0);
        assert_eq!(empty.affected_percent, 0.0);
    }

    fn policies() -> Vec<Policy> {
        let created_at = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        vec![
            Policy {
                id: "pol1".to_string(),
                name: "Lead Contamination Policy".to_string(),
                metal: "Lead".to_string(),
                threshold: 0.02,
                created_by: "Policy Maker".to_string(),
                created_at,
            },
            Policy {
                id: "pol2".to_string(),
                name: "Arsenic Safety Standard".to_string(),
                metal: "Arsenic".to_string(),
                threshold: 0.015,
                created_by: "Policy Maker".to_string(),
                created_at,
            },
        ]
    }

    #[test]
    fn test_metal_policy_compliance() {
        let policies = policies();
        let checks = metal_policy_compliance(&sample("s1", "p1", "Lead", 0.09), &policies);
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].policy_id, "pol1");
        assert!(!checks[0].compliant);

        let none = metal_policy_compliance(&sample("s2", "p1", "Mercury", 0.001), &policies);
        assert!(none.is_empty());
    }

    #[test]
    fn test_policy_tallies() {
        let samples = vec![
            sample("s1", "p1", "Lead", 0.09),
            sample("s2", "p1", "Lead", 0.02),
            sample("s3", "p1", "Arsenic", 0.04),
            sample("s4", "p1", "Mercury", 0.001),
        ];
        let tallies = policy_tallies(&samples, &policies());
        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].policy_id, "pol1");
        assert_eq!(tallies[0].tally.compliant, 1);
        assert_eq!(tallies[0].tally.violating, 1);
        assert_eq!(tallies[1].tally.violating, 1);
        assert_eq!(tallies[1].tally.rate(), 0.0);
    }
}
