//! CI Invariant Tests
//!
//! Properties that must hold for any input, checked over the reference
//! dataset and synthetic batches.

use hmpi_core::alert::{self, AlertOptions};
use hmpi_core::analysis::assess;
use hmpi_core::ingest::{normalize_all, Dataset, IngestMode, SampleRecord};
use hmpi_core::report;
use hmpi_core::risk::{classify_with_thresholds, RiskThresholds};
use hmpi_core::trends;
use hmpi_core::{compute_index, HmpiError, RiskLevel, Sample, Standards};
use std::path::PathBuf;

fn reference_samples() -> (Dataset, Vec<Sample>) {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("reference_dataset.json");
    let dataset = Dataset::load(&path).unwrap();
    let (samples, rejected) = normalize_all(&dataset.samples, IngestMode::Strict);
    assert!(rejected.is_empty());
    (dataset, samples)
}

#[test]
fn test_index_is_finite_for_valid_input() {
    for si in [0.0, 0.001, 0.5, 12.0, 1e6] {
        for ii in [1e-6, 0.01, 1.0, 250.0] {
            for mi in [0.0, 0.3, 1.0, 7.5] {
                let hmpi = compute_index(si, ii, mi).unwrap();
                assert!(hmpi.is_finite());
                assert!(hmpi >= 0.0);
            }
        }
    }
}

#[test]
fn test_non_positive_limit_is_rejected() {
    for ii in [0.0, -0.1, f64::NAN] {
        assert!(matches!(
            compute_index(0.1, ii, 0.5),
            Err(HmpiError::InvalidInput { .. })
        ));
    }
}

#[test]
fn test_classification_is_monotonic() {
    let thresholds = RiskThresholds::default();
    let mut previous = RiskLevel::Safe;
    let mut hmpi = 0.0;
    while hmpi <= 150.0 {
        let level = classify_with_thresholds(hmpi, &thresholds);
        assert!(level >= previous, "level dropped at {}", hmpi);
        previous = level;
        hmpi += 0.25;
    }
    assert_eq!(previous, RiskLevel::VeryHigh);
}

#[test]
fn test_band_boundaries_are_inclusive() {
    let thresholds = RiskThresholds::default();
    assert_eq!(classify_with_thresholds(10.0, &thresholds), RiskLevel::Low);
    assert_eq!(classify_with_thresholds(25.0, &thresholds), RiskLevel::Moderate);
    assert_eq!(classify_with_thresholds(50.0, &thresholds), RiskLevel::High);
    assert_eq!(classify_with_thresholds(100.0, &thresholds), RiskLevel::VeryHigh);
    assert_eq!(classify_with_thresholds(9.99, &thresholds), RiskLevel::Safe);
}

#[test]
fn test_alert_order_independent_of_input_order() {
    let (dataset, samples) = reference_samples();
    let standards = Standards::reference();
    let options = AlertOptions {
        caution_index: Some(10.0),
    };

    let forward = alert::evaluate_all(&samples, &dataset.projects, &standards, &options);
    let mut reversed_samples = samples.clone();
    reversed_samples.reverse();
    let reversed = alert::evaluate_all(&reversed_samples, &dataset.projects, &standards, &options);

    assert_eq!(forward, reversed);
}

#[test]
fn test_at_most_one_alert_per_sample() {
    let (dataset, samples) = reference_samples();
    let evaluation = alert::evaluate_all(
        &samples,
        &dataset.projects,
        &Standards::reference(),
        &AlertOptions {
            caution_index: Some(0.0),
        },
    );

    let mut ids: Vec<&str> = evaluation.alerts.iter().map(|a| a.sample_id.as_str()).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[test]
fn test_reports_are_byte_identical_across_runs() {
    let (dataset, samples) = reference_samples();
    let standards = Standards::reference();

    let render = || {
        let assessment = assess(&samples, &RiskThresholds::default());
        let rows = report::build_rows(&assessment.assessed, &dataset.projects, &standards);
        let stats = trends::trend_stats(&assessment.assessed);
        (
            report::render_csv(&rows),
            report::render_text(&rows, None),
            report::render_json(&rows).unwrap(),
            stats.to_json().unwrap(),
        )
    };

    assert_eq!(render(), render());
}

#[test]
fn test_bad_sample_fails_alone() {
    let (_, mut samples) = reference_samples();
    let mut broken = samples[0].clone();
    broken.sample_id = "BROKEN".to_string();
    broken.ii = 0.0;
    samples.insert(3, broken);

    let assessment = assess(&samples, &RiskThresholds::default());
    assert_eq!(assessment.assessed.len(), 7);
    assert_eq!(assessment.rejected.len(), 1);
    assert_eq!(assessment.rejected[0].sample_id, "BROKEN");
}

#[test]
fn test_strict_ingest_rejects_missing_numerics() {
    let record = SampleRecord {
        sample_id: "X-1".to_string(),
        project_id: "p1".to_string(),
        metal: "Lead".to_string(),
        si: Some(0.1),
        ii: None,
        mi: Some(0.5),
        date: "2025-01-01".to_string(),
        ..Default::default()
    };

    let (strict, strict_rejected) = normalize_all(std::slice::from_ref(&record), IngestMode::Strict);
    assert!(strict.is_empty());
    assert_eq!(strict_rejected.len(), 1);

    let (lenient, lenient_rejected) = normalize_all(&[record], IngestMode::Lenient);
    assert!(lenient_rejected.is_empty());
    assert_eq!(lenient[0].ii, 1.0);
}
