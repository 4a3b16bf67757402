//! Data model shared by every component
//!
//! Records mirror the field contracts of the storage boundary. They are read-only
//! inputs to the engine; nothing here is mutated after construction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{HmpiError, Result};

/// One measured observation of a single metal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Sample {
    pub sample_id: String,
    pub project_id: String,
    pub metal: String,
    /// Measured concentration, mg/L
    pub si: f64,
    /// Permissible limit, mg/L
    pub ii: f64,
    /// Relative weight
    pub mi: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub date: NaiveDate,
}

/// A monitoring campaign with its HMPI ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Project {
    pub project_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub district: String,
    pub city: String,
    pub policy_threshold_hmpi: f64,
}

impl Project {
    /// Short display name ("Ganga Study - Varanasi" -> "Varanasi")
    pub fn short_name(&self) -> &str {
        self.name
            .split_once(" - ")
            .map(|(_, suffix)| suffix)
            .unwrap_or(&self.name)
    }
}

/// A metal-specific concentration limit set by a policy maker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub metal: String,
    /// Concentration limit, mg/L
    pub threshold: f64,
    pub created_by: String,
    pub created_at: NaiveDate,
}

/// Alert severity, ordered low < medium < high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(AlertSeverity::Low),
            "medium" => Some(AlertSeverity::Medium),
            "high" => Some(AlertSeverity::High),
            _ => None,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted alert record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Alert {
    pub id: String,
    pub project_id: String,
    pub sample_id: String,
    pub message: String,
    pub severity: AlertSeverity,
    #[serde(default)]
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

/// Standards body publishing a reference table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authority {
    #[serde(rename = "WHO")]
    Who,
    #[serde(rename = "BBI")]
    Bbi,
}

impl Authority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Authority::Who => "WHO",
            Authority::Bbi => "BBI",
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metal -> permissible concentration (mg/L)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StandardTable {
    limits: BTreeMap<String, f64>,
}

impl StandardTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, metal: &str, limit: f64) -> Self {
        self.limits.insert(metal.to_string(), limit);
        self
    }

    pub fn limit(&self, metal: &str) -> Option<f64> {
        self.limits.get(metal).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.limits.iter().map(|(metal, limit)| (metal.as_str(), *limit))
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    /// Overlay `other` on top of this table; entries in `other` win
    pub fn merged_with(&self, other: &StandardTable) -> StandardTable {
        let mut limits = self.limits.clone();
        for (metal, limit) in &other.limits {
            limits.insert(metal.clone(), *limit);
        }
        StandardTable { limits }
    }
}

/// The two parallel reference tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Standards {
    #[serde(rename = "WHO", default)]
    pub who: StandardTable,
    #[serde(rename = "BBI", default)]
    pub bbi: StandardTable,
}

impl Standards {
    /// Built-in WHO and BBI drinking-water limits for the monitored metals
    pub fn reference() -> Self {
        Standards {
            who: StandardTable::new()
                .with_limit("Lead", 0.01)
                .with_limit("Arsenic", 0.01)
                .with_limit("Chromium", 0.05)
                .with_limit("Mercury", 0.006)
                .with_limit("Cadmium", 0.003),
            bbi: StandardTable::new()
                .with_limit("Lead", 0.05)
                .with_limit("Arsenic", 0.05)
                .with_limit("Chromium", 0.1)
                .with_limit("Mercury", 0.001)
                .with_limit("Cadmium", 0.005),
        }
    }

    pub fn table(&self, authority: Authority) -> &StandardTable {
        match authority {
            Authority::Who => &self.who,
            Authority::Bbi => &self.bbi,
        }
    }

    /// Look up a limit, failing with `MissingStandard` for unknown metals
    pub fn limit(&self, authority: Authority, metal: &str) -> Result<f64> {
        self.table(authority)
            .limit(metal)
            .ok_or_else(|| HmpiError::MissingStandard {
                authority: authority.as_str().to_string(),
                metal: metal.to_string(),
            })
    }

    pub fn merged_with(&self, overrides: &Standards) -> Standards {
        Standards {
            who: self.who.merged_with(&overrides.who),
            bbi: self.bbi.merged_with(&overrides.bbi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_standards_cover_monitored_metals() {
        let standards = Standards::reference();
        for metal in ["Lead", "Arsenic", "Chromium", "Mercury", "Cadmium"] {
            assert!(standards.limit(Authority::Who, metal).is_ok());
            assert!(standards.limit(Authority::Bbi, metal).is_ok());
        }
        assert_eq!(standards.limit(Authority::Who, "Lead"), Ok(0.01));
        assert_eq!(standards.limit(Authority::Bbi, "Lead"), Ok(0.05));
    }

    #[test]
    fn test_missing_standard_names_authority_and_metal() {
        let err = Standards::reference()
            .limit(Authority::Bbi, "Uranium")
            .unwrap_err();
        assert_eq!(
            err,
            HmpiError::MissingStandard {
                authority: "BBI".to_string(),
                metal: "Uranium".to_string(),
            }
        );
    }

    #[test]
    fn test_merge_overrides_win() {
        let overrides = Standards {
            who: StandardTable::new().with_limit("Lead", 0.02).with_limit("Nickel", 0.07),
            bbi: StandardTable::new(),
        };
        let merged = Standards::reference().merged_with(&overrides);
        assert_eq!(merged.who.limit("Lead"), Some(0.02));
        assert_eq!(merged.who.limit("Nickel"), Some(0.07));
        assert_eq!(merged.bbi.limit("Lead"), Some(0.05));
    }

    #[test]
    fn test_standards_json_uses_authority_keys() {
        let json = r#"{"WHO": {"Lead": 0.01}, "BBI": {"Lead": 0.05}}"#;
        let standards: Standards = serde_json::from_str(json).unwrap();
        assert_eq!(standards.who.limit("Lead"), Some(0.01));
        assert_eq!(standards.bbi.limit("Lead"), Some(0.05));
    }

    #[test]
    fn test_severity_ordering_and_names() {
        assert!(AlertSeverity::High > AlertSeverity::Medium);
        assert!(AlertSeverity::Medium > AlertSeverity::Low);
        assert_eq!(AlertSeverity::parse("medium"), Some(AlertSeverity::Medium));
        assert_eq!(AlertSeverity::parse("critical"), None);
        assert_eq!(serde_json::to_string(&AlertSeverity::High).unwrap(), "\"high\"");
    }

    #[test]
    fn test_project_short_name() {
        let project = Project {
            project_id: "p1".to_string(),
            name: "Ganga Water Quality Study - Varanasi".to_string(),
            description: String::new(),
            district: "Varanasi".to_string(),
            city: "Varanasi".to_string(),
            policy_threshold_hmpi: 100.0,
        };
        assert_eq!(project.short_name(), "Varanasi");
    }
}
