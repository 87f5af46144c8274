// =============================================================================
// Fit-Statistic Extraction
// =============================================================================
//
// Projects a fitted result onto a fixed, ordered list of statistics. The
// projection is all-or-nothing: if the result lacks any requested statistic
// (typically the ".scaled" variants requested from a non-robust estimator),
// extraction fails with MissingStatistic instead of leaving a hole that
// would make the comparison table ragged.
//
// =============================================================================

use serde::Serialize;

use crate::engine::FittedModel;
use crate::error::{MultiGroupError, Result};
use crate::stats::{FitStatistic, StatisticSet};

/// Named statistic values for one group or constraint level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitRecord {
    label: String,
    entries: Vec<(FitStatistic, f64)>,
}

impl FitRecord {
    /// Build a record directly. Each statistic may appear once.
    pub fn new(label: impl Into<String>, entries: Vec<(FitStatistic, f64)>) -> Result<Self> {
        let label = label.into();
        for (i, (stat, _)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(s, _)| s == stat) {
                return Err(MultiGroupError::InvalidValue(format!(
                    "fit record '{}' lists statistic '{}' more than once",
                    label,
                    stat.name()
                )));
            }
        }
        Ok(Self { label, entries })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entries(&self) -> &[(FitStatistic, f64)] {
        &self.entries
    }

    pub fn get(&self, stat: FitStatistic) -> Option<f64> {
        self.entries.iter().find(|(s, _)| *s == stat).map(|(_, v)| *v)
    }

    pub fn keys(&self) -> impl Iterator<Item = FitStatistic> + '_ {
        self.entries.iter().map(|(s, _)| *s)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extraction result for one entry of a batch.
///
/// A group that failed to fit stays a failure; it is never zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GroupRecord {
    Fitted(FitRecord),
    Failed { label: String, reason: String },
}

impl GroupRecord {
    pub fn label(&self) -> &str {
        match self {
            GroupRecord::Fitted(record) => record.label(),
            GroupRecord::Failed { label, .. } => label,
        }
    }

    pub fn as_fitted(&self) -> Option<&FitRecord> {
        match self {
            GroupRecord::Fitted(record) => Some(record),
            GroupRecord::Failed { .. } => None,
        }
    }
}

/// Pull exactly `stats`, in order, out of `model`.
pub fn extract(label: &str, model: &FittedModel, stats: &StatisticSet) -> Result<FitRecord> {
    let entries = stats
        .iter()
        .map(|stat| {
            model
                .statistic(stat)
                .map(|value| (stat, value))
                .ok_or_else(|| MultiGroupError::MissingStatistic {
                    label: label.to_string(),
                    statistic: stat.name().to_string(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FitRecord {
        label: label.to_string(),
        entries,
    })
}
