//! Risk classification of HMPI values
//!
//! Global invariants enforced:
//! - Total: every real number maps to exactly one level
//! - Half-open bands `[low, high)`, evaluated from the highest band down
//! - Monotonic: a larger index never yields a lower level

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered risk level (Safe < Low < Moderate < High < VeryHigh)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "Safe")]
    Safe, // < 10
    #[serde(rename = "Low Risk")]
    Low, // 10-25
    #[serde(rename = "Moderate Risk")]
    Moderate, // 25-50
    #[serde(rename = "High Risk")]
    High, // 50-100
    #[serde(rename = "Very High Risk")]
    VeryHigh, // >= 100
}

impl RiskLevel {
    /// All levels in ascending order
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::Safe,
        RiskLevel::Low,
        RiskLevel::Moderate,
        RiskLevel::High,
        RiskLevel::VeryHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Safe",
            RiskLevel::Low => "Low Risk",
            RiskLevel::Moderate => "Moderate Risk",
            RiskLevel::High => "High Risk",
            RiskLevel::VeryHigh => "Very High Risk",
        }
    }

    /// Display colour used by charts and maps
    pub fn color(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "#059669",
            RiskLevel::Low => "#65A30D",
            RiskLevel::Moderate => "#D97706",
            RiskLevel::High => "#EA580C",
            RiskLevel::VeryHigh => "#DC2626",
        }
    }

    /// High or Very High
    pub fn is_high_plus(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::VeryHigh)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower bounds of each non-safe band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    pub low: f64,
    pub moderate: f64,
    pub high: f64,
    pub very_high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        RiskThresholds {
            low: 10.0,
            moderate: 25.0,
            high: 50.0,
            very_high: 100.0,
        }
    }
}

/// Classify with the default bands
pub fn classify(hmpi: f64) -> RiskLevel {
    classify_with_thresholds(hmpi, &RiskThresholds::default())
}

/// Classify with custom bands
///
/// NaN fails every comparison and lands in Safe.
pub fn classify_with_thresholds(hmpi: f64, thresholds: &RiskThresholds) -> RiskLevel {
    if hmpi >= thresholds.very_high {
        RiskLevel::VeryHigh
    } else if hmpi >= thresholds.high {
        RiskLevel::High
    } else if hmpi >= thresholds.moderate {
        RiskLevel::Moderate
    } else if hmpi >= thresholds.low {
        RiskLevel::Low
    } else {
        RiskLevel::Safe
    }
}
