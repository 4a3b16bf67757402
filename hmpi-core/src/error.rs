//! Error taxonomy for the assessment engine
//!
//! Every error is local to the sample or collection that produced it.
//! Nothing here is transient, so nothing is retried.

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, HmpiError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HmpiError {
    /// A numeric field is missing, non-finite, or out of range
    #[error("invalid input: {field} {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// A strict mean was requested over zero samples
    #[error("empty input: {0} requires at least one sample")]
    EmptyInput(&'static str),

    /// A metal has no entry in the named standard table
    #[error("missing standard: no {authority} limit for metal '{metal}'")]
    MissingStandard { authority: String, metal: String },

    /// A sample references a project the caller did not supply
    #[error("missing reference: sample '{sample_id}' references unknown project '{project_id}'")]
    MissingReference {
        sample_id: String,
        project_id: String,
    },
}

impl HmpiError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        HmpiError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}
