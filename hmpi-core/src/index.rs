//! Heavy Metal Pollution Index (HMPI) calculation
//!
//! Formula:
//! HMPI = (Si / Ii) * Mi * 100, rounded to two decimal places
//!
//! Global invariants enforced:
//! - Deterministic, referentially transparent
//! - Never yields NaN or infinity; invalid inputs are rejected before computing
//! - Strictly increasing in Si, strictly decreasing in Ii (before rounding)

use crate::error::{HmpiError, Result};
use crate::model::Sample;

/// Round to two decimal places, halves away from zero
///
/// The half test applies to the binary product `value * 100`, not to the
/// decimal literal: `round_to_hundredths(0.125) == 0.13`, but
/// `round_to_hundredths(1.005) == 1.0` because `1.005 * 100` is
/// `100.49999999999999`.
pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the HMPI for a single measurement
///
/// Preconditions (violations return `InvalidInput`):
/// - `si` finite and >= 0 (zero concentration is valid and scores 0)
/// - `ii` finite and > 0
/// - `mi` finite and >= 0
pub fn compute_index(si: f64, ii: f64, mi: f64) -> Result<f64> {
    if !si.is_finite() {
        return Err(HmpiError::invalid("si", "must be a finite number"));
    }
    if si < 0.0 {
        return Err(HmpiError::invalid(
            "si",
            format!("must be non-negative (got {})", si),
        ));
    }
    if !ii.is_finite() {
        return Err(HmpiError::invalid("ii", "must be a finite number"));
    }
    if ii <= 0.0 {
        return Err(HmpiError::invalid(
            "ii",
            format!("must be positive (got {})", ii),
        ));
    }
    if !mi.is_finite() {
        return Err(HmpiError::invalid("mi", "must be a finite number"));
    }
    if mi < 0.0 {
        return Err(HmpiError::invalid(
            "mi",
            format!("must be non-negative (got {})", mi),
        ));
    }

    let raw = (si / ii) * mi * 100.0;

    // Huge Si with tiny Ii can still overflow
    if !raw.is_finite() {
        return Err(HmpiError::invalid(
            "si",
            format!("index overflows for si={} ii={} mi={}", si, ii, mi),
        ));
    }

    Ok(round_to_hundredths(raw))
}

/// Compute the HMPI for a sample record
pub fn sample_index(sample: &Sample) -> Result<f64> {
    compute_index(sample.si, sample.ii, sample.mi)
}
