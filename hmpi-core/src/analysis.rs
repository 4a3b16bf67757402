//! Batch assessment - ties together index calculation and risk classification
//!
//! A bad sample fails only its own computation. It is skipped and reported
//! as a `Rejection`; the rest of the batch is still assessed.

use crate::error::HmpiError;
use crate::index;
use crate::model::Sample;
use crate::risk::{self, RiskLevel, RiskThresholds};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A sample together with its derived index and risk level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AssessedSample {
    #[serde(flatten)]
    pub sample: Sample,
    pub hmpi: f64,
    pub risk: RiskLevel,
}

/// A sample that could not be assessed
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub sample_id: String,
    pub reason: HmpiError,
}

/// Outcome of assessing a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assessment {
    /// Valid samples, in input order
    pub assessed: Vec<AssessedSample>,
    /// Invalid samples, in input order
    pub rejected: Vec<Rejection>,
}

impl Assessment {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Assess a single sample
pub fn assess_sample(
    sample: &Sample,
    thresholds: &RiskThresholds,
) -> Result<AssessedSample, HmpiError> {
    let hmpi = index::sample_index(sample)?;
    Ok(AssessedSample {
        sample: sample.clone(),
        hmpi,
        risk: risk::classify_with_thresholds(hmpi, thresholds),
    })
}

/// Assess every sample, skipping and reporting invalid ones
///
/// Per-sample work runs in parallel; results are collected in input order,
/// so downstream accumulation order is unchanged.
pub fn assess(samples: &[Sample], thresholds: &RiskThresholds) -> Assessment {
    let results: Vec<Result<AssessedSample, HmpiError>> = samples
        .par_iter()
        .map(|sample| assess_sample(sample, thresholds))
        .collect();

    let mut assessment = Assessment::default();
    for (sample, result) in samples.iter().zip(results) {
        match result {
            Ok(assessed) => assessment.assessed.push(assessed),
            Err(reason) => {
                tracing::warn!(sample_id = %sample.sample_id, error = %reason, "skipping sample");
                assessment.rejected.push(Rejection {
                    sample_id: sample.sample_id.clone(),
                    reason,
                });
            }
        }
    }

    tracing::debug!(
        assessed = assessment.assessed.len(),
        rejected = assessment.rejected.len(),
        "assessed sample batch"
    );

    assessment
}
