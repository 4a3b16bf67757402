//! Alert evaluation
//!
//! Decides, per sample, whether an alert condition holds and at what severity.
//!
//! Rules, first match wins:
//! 1. `high`   - Si exceeds the WHO limit AND the index exceeds the project ceiling
//! 2. `medium` - Si reaches or exceeds the BBI limit
//! 3. `low`    - Si exceeds neither standard but the index exceeds the configured
//!    caution value (disabled when no caution value is configured)
//!
//! Global invariants enforced:
//! - At most one alert per sample per evaluation pass
//! - Pure: same sample, project, standards and options yield the same decision
//! - Evaluation order and output order are deterministic

use crate::analysis::Rejection;
use crate::error::{HmpiError, Result};
use crate::index;
use crate::model::{Alert, AlertSeverity, Authority, Project, Sample, Standards};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Alert rule identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertRule {
    WhoAndPolicyExceeded,
    BbiLimitReached,
    CautionIndexExceeded,
}

impl AlertRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertRule::WhoAndPolicyExceeded => "who-and-policy-exceeded",
            AlertRule::BbiLimitReached => "bbi-limit-reached",
            AlertRule::CautionIndexExceeded => "caution-index-exceeded",
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertRule::WhoAndPolicyExceeded => AlertSeverity::High,
            AlertRule::BbiLimitReached => AlertSeverity::Medium,
            AlertRule::CautionIndexExceeded => AlertSeverity::Low,
        }
    }
}

/// Tunables for alert evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlertOptions {
    /// Index above which a low-severity alert fires; `None` disables rule 3
    pub caution_index: Option<f64>,
}

/// An alert decision, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AlertDraft {
    pub project_id: String,
    pub sample_id: String,
    pub metal: String,
    pub rule: AlertRule,
    pub severity: AlertSeverity,
    pub concentration: f64,
    /// The limit the concentration was compared against
    pub limit: f64,
    pub authority: Authority,
    pub hmpi: f64,
    pub message: String,
}

impl AlertDraft {
    /// Deterministic id: one alert per project/sample pair
    pub fn default_id(&self) -> String {
        format!("{}:{}", self.project_id, self.sample_id)
    }

    /// Turn the decision into a record; acknowledgement starts false
    pub fn into_alert(self, id: String, created_at: DateTime<Utc>) -> Alert {
        Alert {
            id,
            project_id: self.project_id,
            sample_id: self.sample_id,
            message: self.message,
            severity: self.severity,
            acknowledged: false,
            created_at,
        }
    }
}

/// Evaluate one sample against its project and the WHO/BBI standards
///
/// Errors:
/// - `MissingReference` if `project` is not the sample's project
/// - `InvalidInput` if the index cannot be computed
/// - `MissingStandard` if either table lacks the sample's metal
pub fn evaluate(
    sample: &Sample,
    project: &Project,
    standards: &Standards,
    options: &AlertOptions,
) -> Result<Option<AlertDraft>> {
    if sample.project_id != project.project_id {
        return Err(HmpiError::MissingReference {
            sample_id: sample.sample_id.clone(),
            project_id: sample.project_id.clone(),
        });
    }

    let hmpi = index::sample_index(sample)?;
    let who_limit = standards.limit(Authority::Who, &sample.metal)?;
    let bbi_limit = standards.limit(Authority::Bbi, &sample.metal)?;

    let exceeds_who = sample.si > who_limit;
    let reaches_bbi = sample.si >= bbi_limit;

    // Rule 1
    if exceeds_who && hmpi > project.policy_threshold_hmpi {
        let message = format!(
            "{} levels ({} mg/L) exceeded WHO safe limits ({} mg/L) in sample {}; HMPI {:.2} exceeds project threshold {:.2}",
            sample.metal, sample.si, who_limit, sample.sample_id, hmpi, project.policy_threshold_hmpi
        );
        return Ok(Some(draft(
            sample,
            AlertRule::WhoAndPolicyExceeded,
            who_limit,
            Authority::Who,
            hmpi,
            message,
        )));
    }

    // Rule 2
    if reaches_bbi {
        let relation = if sample.si == bbi_limit {
            "equal to BBI threshold"
        } else {
            "exceeded BBI limits"
        };
        let message = format!(
            "{} levels ({} mg/L) {} ({} mg/L) in sample {}",
            sample.metal, sample.si, relation, bbi_limit, sample.sample_id
        );
        return Ok(Some(draft(
            sample,
            AlertRule::BbiLimitReached,
            bbi_limit,
            Authority::Bbi,
            hmpi,
            message,
        )));
    }

    // Rule 3
    if let Some(caution) = options.caution_index {
        if !exceeds_who && hmpi > caution {
            let message = format!(
                "{} HMPI {:.2} exceeded caution level {:.2} in sample {} ({} mg/L, within WHO limit {} mg/L)",
                sample.metal, hmpi, caution, sample.sample_id, sample.si, who_limit
            );
            return Ok(Some(draft(
                sample,
                AlertRule::CautionIndexExceeded,
                who_limit,
                Authority::Who,
                hmpi,
                message,
            )));
        }
    }

    Ok(None)
}

fn draft(
    sample: &Sample,
    rule: AlertRule,
    limit: f64,
    authority: Authority,
    hmpi: f64,
    message: String,
) -> AlertDraft {
    AlertDraft {
        project_id: sample.project_id.clone(),
        sample_id: sample.sample_id.clone(),
        metal: sample.metal.clone(),
        rule,
        severity: rule.severity(),
        concentration: sample.si,
        limit,
        authority,
        hmpi,
        message,
    }
}

/// Outcome of evaluating a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertEvaluation {
    /// Sorted: severity descending, then sample id, then project id
    pub alerts: Vec<AlertDraft>,
    pub rejected: Vec<Rejection>,
}

impl AlertEvaluation {
    pub fn count(&self, severity: AlertSeverity) -> usize {
        self.alerts.iter().filter(|a| a.severity == severity).count()
    }
}

/// Evaluate every sample, joining each to its project
///
/// Samples that cannot be evaluated are skipped and reported.
pub fn evaluate_all(
    samples: &[Sample],
    projects: &[Project],
    standards: &Standards,
    options: &AlertOptions,
) -> AlertEvaluation {
    let by_id: HashMap<&str, &Project> = projects
        .iter()
        .map(|p| (p.project_id.as_str(), p))
        .collect();

    let mut evaluation = AlertEvaluation::default();

    for sample in samples {
        let outcome = match by_id.get(sample.project_id.as_str()) {
            Some(project) => evaluate(sample, project, standards, options),
            None => Err(HmpiError::MissingReference {
                sample_id: sample.sample_id.clone(),
                project_id: sample.project_id.clone(),
            }),
        };

        match outcome {
            Ok(Some(alert)) => evaluation.alerts.push(alert),
            Ok(None) => {}
            Err(reason) => {
                tracing::warn!(sample_id = %sample.sample_id, error = %reason, "alert evaluation skipped sample");
                evaluation.rejected.push(Rejection {
                    sample_id: sample.sample_id.clone(),
                    reason,
                });
            }
        }
    }

    evaluation.alerts.sort_by(compare_alerts);

    tracing::debug!(
        alerts = evaluation.alerts.len(),
        rejected = evaluation.rejected.len(),
        "evaluated alerts"
    );

    evaluation
}

/// Severity descending, then sample id, then project id
fn compare_alerts(a: &AlertDraft, b: &AlertDraft) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| a.sample_id.cmp(&b.sample_id))
        .then_with(|| a.project_id.cmp(&b.project_id))
}
