// =============================================================================
// Error Types
// =============================================================================
//
// One error enum for the whole library. The variants fall into three groups:
//
//   RECOVERABLE (per group / per level):
//     - ConvergenceFailure: the engine could not produce usable estimates
//     - Timeout:            a single fit ran past the configured limit
//     The fitter records these in place of a result and keeps going.
//
//   CONFIGURATION / SCHEMA:
//     - MissingStatistic, SchemaMismatch, UnknownStatistic, DuplicateLabel,
//       InvalidSpecification, UnsupportedModel, OutOfOrder
//     These mean the caller asked for something inconsistent. They abort the
//     operation, because silently continuing would produce ragged tables.
//
//   PLUMBING:
//     - numeric validation, I/O, CSV and JSON errors
//
// =============================================================================

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MultiGroupError>;

#[derive(Debug, Error)]
pub enum MultiGroupError {
    /// The engine could not produce stable estimates for one group or level.
    #[error("model for '{label}' failed to converge: {reason}")]
    ConvergenceFailure { label: String, reason: String },

    /// A single fit exceeded the per-fit time limit.
    #[error("model for '{label}' did not finish within {limit:?}")]
    Timeout { label: String, limit: Duration },

    /// A fitted result does not expose a requested statistic.
    #[error("fitted result for '{label}' has no statistic '{statistic}'")]
    MissingStatistic { label: String, statistic: String },

    /// Two records meant for the same table have different key sets.
    #[error(
        "record '{label}' does not match the table schema (missing: [{}], extra: [{}])",
        .missing.join(", "),
        .extra.join(", ")
    )]
    SchemaMismatch {
        label: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// Two groups or levels share the same name / nesting position.
    #[error("duplicate label '{0}'")]
    DuplicateLabel(String),

    /// A statistic name outside the closed key set.
    #[error("unknown fit statistic '{0}'")]
    UnknownStatistic(String),

    /// Model syntax could not be parsed.
    #[error("invalid model specification: {0}")]
    InvalidSpecification(String),

    /// The engine cannot fit this kind of model or constraint.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// Invariance levels must be fitted strictly in nesting order.
    #[error("invariance level out of order: expected {expected}, found {found}")]
    OutOfOrder { expected: String, found: String },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("linear algebra error: {0}")]
    LinearAlgebraError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MultiGroupError {
    /// True for failures that belong to a single group or level.
    ///
    /// The fitter records these and continues with the remaining groups;
    /// everything else is propagated to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MultiGroupError::ConvergenceFailure { .. } | MultiGroupError::Timeout { .. }
        )
    }

    pub(crate) fn convergence(label: &str, reason: impl Into<String>) -> Self {
        MultiGroupError::ConvergenceFailure {
            label: label.to_string(),
            reason: reason.into(),
        }
    }
}
