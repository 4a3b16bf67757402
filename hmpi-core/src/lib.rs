//! HMPI core library - heavy metal pollution index assessment for water-quality monitoring

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Every computation is pure and synchronous
// - No global mutable state; the engine never holds a collection across calls
// - No NaN or infinity is ever produced from validated input
// - Deterministic ordering must be explicit (sorted keys, stable sorts)
// - A bad sample fails only its own computation; batches skip and report

pub mod aggregates;
pub mod alert;
pub mod analysis;
pub mod compliance;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod model;
pub mod report;
pub mod risk;
pub mod store;
pub mod trends;

pub use analysis::{assess, AssessedSample, Assessment, Rejection};
pub use config::ResolvedConfig;
pub use error::{HmpiError, Result};
pub use index::compute_index;
pub use model::{Alert, AlertSeverity, Authority, Policy, Project, Sample, Standards};
pub use risk::{classify, RiskLevel};
pub use store::{MemoryRepository, SampleFilter, SampleRepository, SqliteRepository};

/// Everything one command needs, fetched from a repository in a single pass
#[derive(Debug, Clone)]
pub struct MonitoringData {
    pub projects: Vec<Project>,
    pub policies: Vec<Policy>,
    pub alerts: Vec<Alert>,
    /// Effective standards (reference, then stored overrides, then config)
    pub standards: Standards,
    /// Valid samples, assessed, in repository order
    pub assessment: Assessment,
    /// Records rejected at ingestion
    pub ingest_rejected: Vec<Rejection>,
}

impl MonitoringData {
    pub fn samples(&self) -> Vec<Sample> {
        self.assessment
            .assessed
            .iter()
            .map(|a| a.sample.clone())
            .collect()
    }
}

/// Fetch, validate and assess the samples matching `filter`
pub fn load_monitoring_data(
    repo: &dyn SampleRepository,
    filter: &SampleFilter,
    config: &ResolvedConfig,
) -> anyhow::Result<MonitoringData> {
    let records = repo.list_samples(filter)?;
    let (samples, ingest_rejected) = ingest::normalize_all(&records, config.ingest_mode);
    let assessment = assess(&samples, &config.risk_thresholds);
    let stored = repo.standard_overrides()?;

    tracing::info!(
        records = records.len(),
        assessed = assessment.assessed.len(),
        rejected = ingest_rejected.len() + assessment.rejected.len(),
        "loaded monitoring data"
    );

    Ok(MonitoringData {
        projects: repo.list_projects()?,
        policies: repo.list_policies()?,
        alerts: repo.list_alerts()?,
        standards: config.standards_with(stored.as_ref()),
        assessment,
        ingest_rejected,
    })
}
