//! Record ingestion - raw sample records into validated `Sample`s
//!
//! Missing numeric fields are only ever filled in `IngestMode::Lenient`
//! (`si = 0`, `ii = 1`, `mi = 1`). Strict mode rejects them. Both modes
//! reject non-finite values, `ii <= 0`, negative `si`/`mi`, empty identifiers
//! and unparseable dates.

use crate::analysis::Rejection;
use crate::error::{HmpiError, Result};
use crate::model::{Alert, Policy, Project, Sample, Standards};
use anyhow::Context;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Defaults applied by lenient ingestion
pub const DEFAULT_SI: f64 = 0.0;
pub const DEFAULT_II: f64 = 1.0;
pub const DEFAULT_MI: f64 = 1.0;

/// How missing numeric fields are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Fill missing `si`/`ii`/`mi` with documented defaults
    #[default]
    Lenient,
    /// Reject records with missing numeric fields
    Strict,
}

/// A sample as it arrives from storage or a dataset file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SampleRecord {
    #[serde(default)]
    pub sample_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub metal: String,
    #[serde(default)]
    pub si: Option<f64>,
    #[serde(default)]
    pub ii: Option<f64>,
    #[serde(default)]
    pub mi: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp
    #[serde(default)]
    pub date: String,
}

impl From<&Sample> for SampleRecord {
    fn from(sample: &Sample) -> Self {
        SampleRecord {
            sample_id: sample.sample_id.clone(),
            project_id: sample.project_id.clone(),
            metal: sample.metal.clone(),
            si: Some(sample.si),
            ii: Some(sample.ii),
            mi: Some(sample.mi),
            latitude: sample.latitude,
            longitude: sample.longitude,
            district: sample.district.clone(),
            city: sample.city.clone(),
            date: sample.date.format("%Y-%m-%d").to_string(),
        }
    }
}

fn required_text(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HmpiError::invalid(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn numeric(field: &'static str, value: Option<f64>, default: f64, mode: IngestMode) -> Result<f64> {
    let value = match (value, mode) {
        (Some(v), _) => v,
        (None, IngestMode::Lenient) => default,
        (None, IngestMode::Strict) => return Err(HmpiError::invalid(field, "is missing")),
    };
    if !value.is_finite() {
        return Err(HmpiError::invalid(field, "must be a finite number"));
    }
    Ok(value)
}

fn coordinate(field: &'static str, value: Option<f64>, bound: f64) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v.abs() > bound => Err(HmpiError::invalid(
            field,
            format!("must be within +/-{} (got {})", bound, v),
        )),
        other => Ok(other),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse a collection date
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .map_err(|_| HmpiError::invalid("date", format!("is not a valid date: '{}'", value)))
}

/// Validate one record
pub fn normalize(record: &SampleRecord, mode: IngestMode) -> Result<Sample> {
    let sample_id = required_text("sample_id", &record.sample_id)?;
    let project_id = required_text("project_id", &record.project_id)?;
    let metal = required_text("metal", &record.metal)?;

    let si = numeric("si", record.si, DEFAULT_SI, mode)?;
    let ii = numeric("ii", record.ii, DEFAULT_II, mode)?;
    let mi = numeric("mi", record.mi, DEFAULT_MI, mode)?;
    if si < 0.0 {
        return Err(HmpiError::invalid("si", format!("must be non-negative (got {})", si)));
    }
    if ii <= 0.0 {
        return Err(HmpiError::invalid("ii", format!("must be positive (got {})", ii)));
    }
    if mi < 0.0 {
        return Err(HmpiError::invalid("mi", format!("must be non-negative (got {})", mi)));
    }

    Ok(Sample {
        sample_id,
        project_id,
        metal,
        si,
        ii,
        mi,
        latitude: coordinate("latitude", record.latitude, 90.0)?,
        longitude: coordinate("longitude", record.longitude, 180.0)?,
        district: non_blank(&record.district),
        city: non_blank(&record.city),
        date: parse_date(&record.date)?,
    })
}

/// Validate a batch, skipping and reporting bad records
///
/// A sample id is unique within its project: the first record wins and
/// every later record with the same `(project_id, sample_id)` is rejected.
pub fn normalize_all(records: &[SampleRecord], mode: IngestMode) -> (Vec<Sample>, Vec<Rejection>) {
    let mut samples = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for record in records {
        let outcome = normalize(record, mode).and_then(|sample| {
            if seen.insert((sample.project_id.clone(), sample.sample_id.clone())) {
                Ok(sample)
            } else {
                Err(HmpiError::invalid(
                    "sample_id",
                    format!(
                        "duplicate sample id '{}' in project '{}'",
                        sample.sample_id, sample.project_id
                    ),
                ))
            }
        });

        match outcome {
            Ok(sample) => samples.push(sample),
            Err(reason) => {
                tracing::warn!(sample_id = %record.sample_id, error = %reason, "rejected sample record");
                rejected.push(Rejection {
                    sample_id: record.sample_id.clone(),
                    reason,
                });
            }
        }
    }

    (samples, rejected)
}

/// Everything a monitoring deployment stores, as one JSON document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Dataset {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub samples: Vec<SampleRecord>,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
    /// Standard overrides shipped with the data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standards: Option<Standards>,
}

impl Dataset {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("failed to parse dataset JSON")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset: {}", path.display()))?;
        let dataset = Self::from_json(&content)
            .with_context(|| format!("invalid dataset: {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            projects = dataset.projects.len(),
            samples = dataset.samples.len(),
            "loaded dataset"
        );
        Ok(dataset)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize dataset to JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SampleRecord {
        SampleRecord {
            sample_id: "GNG-001".to_string(),
            project_id: "p1".to_string(),
            metal: "Lead".to_string(),
            si: Some(0.09),
            ii: Some(0.3),
            mi: Some(0.7),
            latitude: Some(25.3176),
            longitude: Some(82.9739),
            district: Some("Varanasi".to_string()),
            city: Some("Varanasi".to_string()),
            date: "2025-01-12".to_string(),
        }
    }

    #[test]
    fn test_normalize_complete_record() {
        let sample = normalize(&record(), IngestMode::Strict).unwrap();
        assert_eq!(sample.sample_id, "GNG-001");
        assert_eq!(sample.si, 0.09);
        assert_eq!(sample.date, NaiveDate::from_ymd_opt(2025, 1, 12).unwrap());
        assert_eq!(sample.district.as_deref(), Some("Varanasi"));
    }

    #[test]
    fn test_lenient_fills_documented_defaults() {
        let mut r = record();
        r.si = None;
        r.ii = None;
        r.mi = None;
        let sample = normalize(&r, IngestMode::Lenient).unwrap();
        assert_eq!(sample.si, DEFAULT_SI);
        assert_eq!(sample.ii, DEFAULT_II);
        assert_eq!(sample.mi, DEFAULT_MI);
    }

    #[test]
    fn test_strict_rejects_missing_values() {
        let mut r = record();
        r.mi = None;
        let err = normalize(&r, IngestMode::Strict).unwrap_err();
        assert!(matches!(err, HmpiError::InvalidInput { field: "mi", .. }));
    }

    #[test]
    fn test_both_modes_reject_out_of_range() {
        for mode in [IngestMode::Lenient, IngestMode::Strict] {
            let mut r = record();
            r.ii = Some(0.0);
            assert!(matches!(
                normalize(&r, mode),
                Err(HmpiError::InvalidInput { field: "ii", .. })
            ));

            let mut r = record();
            r.si = Some(-0.1);
            assert!(matches!(
                normalize(&r, mode),
                Err(HmpiError::InvalidInput { field: "si", .. })
            ));

            let mut r = record();
            r.mi = Some(f64::NAN);
            assert!(matches!(
                normalize(&r, mode),
                Err(HmpiError::InvalidInput { field: "mi", .. })
            ));
        }
    }

    #[test]
    fn test_rejects_empty_identifiers_and_bad_dates() {
        let mut r = record();
        r.sample_id = "   ".to_string();
        assert!(matches!(
            normalize(&r, IngestMode::Lenient),
            Err(HmpiError::InvalidInput { field: "sample_id", .. })
        ));

        let mut r = record();
        r.date = "12/01/2025".to_string();
        assert!(matches!(
            normalize(&r, IngestMode::Lenient),
            Err(HmpiError::InvalidInput { field: "date", .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_coordinates() {
        let mut r = record();
        r.latitude = Some(91.0);
        assert!(matches!(
            normalize(&r, IngestMode::Lenient),
            Err(HmpiError::InvalidInput { field: "latitude", .. })
        ));
    }

    #[test]
    fn test_accepts_rfc3339_dates() {
        assert_eq!(
            parse_date("2025-02-03T09:15:00Z").unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()
        );
    }

    #[test]
    fn test_blank_district_becomes_none() {
        let mut r = record();
        r.district = Some(" ".to_string());
        let sample = normalize(&r, IngestMode::Lenient).unwrap();
        assert_eq!(sample.district, None);
    }

    #[test]
    fn test_normalize_all_skips_and_reports() {
        let mut bad = record();
        bad.sample_id = "BAD-1".to_string();
        bad.ii = Some(-1.0);
        let records = vec![record(), bad];

        let (samples, rejected) = normalize_all(&records, IngestMode::Lenient);
        assert_eq!(samples.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].sample_id, "BAD-1");
    }

    #[test]
    fn test_normalize_all_rejects_duplicate_sample_id() {
        let mut duplicate = record();
        duplicate.metal = "Arsenic".to_string();
        duplicate.si = Some(0.2);
        let mut other_project = record();
        other_project.project_id = "p2".to_string();
        let records = vec![record(), duplicate, other_project];

        let (samples, rejected) = normalize_all(&records, IngestMode::Lenient);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].metal, "Lead");
        assert_eq!(samples[1].project_id, "p2");
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].sample_id, "GNG-001");
        assert!(matches!(
            rejected[0].reason,
            HmpiError::InvalidInput { field: "sample_id", .. }
        ));
    }

    #[test]
    fn test_duplicate_check_uses_trimmed_ids() {
        let mut padded = record();
        padded.sample_id = " GNG-001 ".to_string();
        let (samples, rejected) = normalize_all(&[record(), padded], IngestMode::Strict);
        assert_eq!(samples.len(), 1);
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_record_from_sample() {
        let sample = normalize(&record(), IngestMode::Strict).unwrap();
        assert_eq!(SampleRecord::from(&sample), record());
    }

    #[test]
    fn test_dataset_from_json() {
        let json = r#"{
            "projects": [{
                "project_id": "p1",
                "name": "Ganga Water Quality Study - Varanasi",
                "district": "Varanasi",
                "city": "Varanasi",
                "policy_threshold_hmpi": 100
            }],
            "samples": [
                {"sample_id": "GNG-001", "project_id": "p1", "metal": "Lead",
                 "si": 0.09, "ii": 0.3, "mi": 0.7, "date": "2025-01-12"}
            ]
        }"#;
        let dataset = Dataset::from_json(json).unwrap();
        assert_eq!(dataset.projects.len(), 1);
        assert_eq!(dataset.samples.len(), 1);
        assert!(dataset.policies.is_empty());
        assert!(dataset.standards.is_none());
    }

    #[test]
    fn test_dataset_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[1, 2").unwrap();
        let err = Dataset::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));
    }
}
