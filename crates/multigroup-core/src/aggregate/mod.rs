// =============================================================================
// Results Aggregation
// =============================================================================
//
// Collects Fit Records into a Comparison Table: one row per group or
// constraint level, one column per statistic, rows in the order given.
//
// SCHEMA RULES:
// -------------
//   - `aggregate` takes its column set from the first record; `from_batch`
//     takes it from the requested statistic set.
//   - Every later record must carry exactly the same statistics (order may
//     differ; values are rearranged into column order). Anything else is a
//     SchemaMismatch naming the missing and the extra keys.
//   - Row labels are unique.
//
// Deltas compare each row with the row immediately before it. The first row
// has no predecessor, so its delta is absent (None), never zero.
//
// =============================================================================

mod pivot;

pub use pivot::{LongEntry, WideTable};

use log::debug;
use serde::Serialize;

use crate::error::{MultiGroupError, Result};
use crate::extract::{FitRecord, GroupRecord};
use crate::fitter::BatchOutcome;
use crate::stats::{FitStatistic, StatisticSet};

/// One labelled row of a comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    label: String,
    values: Vec<f64>,
    deltas: Vec<Option<f64>>,
}

impl ComparisonRow {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Values in the table's column order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Deltas in the order of the table's delta statistics.
    pub fn deltas(&self) -> &[Option<f64>] {
        &self.deltas
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonTable {
    statistics: Vec<FitStatistic>,
    delta_statistics: Vec<FitStatistic>,
    rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    /// A table with the given columns and no rows.
    pub fn with_schema(statistics: &StatisticSet) -> Self {
        Self {
            statistics: statistics.as_slice().to_vec(),
            delta_statistics: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Fold records into a table, in the order given.
    pub fn aggregate<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = FitRecord>,
    {
        let mut records = records.into_iter();
        let first = records
            .next()
            .ok_or_else(|| MultiGroupError::EmptyInput("no records to aggregate".to_string()))?;

        let init = Self {
            statistics: first.keys().collect(),
            delta_statistics: Vec::new(),
            rows: Vec::new(),
        };
        let table = std::iter::once(first)
            .chain(records)
            .try_fold(init, |table, record| table.push(record))?;

        debug!(
            "aggregated {} records over {} statistics",
            table.rows.len(),
            table.statistics.len()
        );
        Ok(table)
    }

    /// Table of the fitted groups of a batch, columns as in `statistics`.
    ///
    /// Failed groups are left out; they are reported separately by the
    /// formatter. A batch where every group failed gives an empty table.
    pub fn from_batch(batch: &BatchOutcome, statistics: &StatisticSet) -> Result<Self> {
        batch
            .extract(statistics)?
            .into_iter()
            .filter_map(|record| match record {
                GroupRecord::Fitted(r) => Some(r),
                GroupRecord::Failed { .. } => None,
            })
            .try_fold(Self::with_schema(statistics), |table, record| table.push(record))
    }

    /// Append one record as the last row.
    pub fn push(mut self, record: FitRecord) -> Result<Self> {
        if self.rows.iter().any(|row| row.label == record.label()) {
            return Err(MultiGroupError::DuplicateLabel(record.label().to_string()));
        }

        let schema_mismatch = || {
            let missing = self
                .statistics
                .iter()
                .filter(|s| record.get(**s).is_none())
                .map(|s| s.name().to_string())
                .collect();
            let extra = record
                .keys()
                .filter(|s| !self.statistics.contains(s))
                .map(|s| s.name().to_string())
                .collect();
            MultiGroupError::SchemaMismatch {
                label: record.label().to_string(),
                missing,
                extra,
            }
        };

        if record.len() != self.statistics.len() {
            return Err(schema_mismatch());
        }
        let values = self
            .statistics
            .iter()
            .map(|s| record.get(*s))
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(schema_mismatch)?;

        // existing rows have deltas computed, the new row gets them too
        let deltas = self
            .delta_statistics
            .iter()
            .map(|stat| {
                let col = self.column_index(*stat)?;
                let prev = self.rows.last()?;
                Some(values[col] - prev.values[col])
            })
            .collect();

        self.rows.push(ComparisonRow {
            label: record.label().to_string(),
            values,
            deltas,
        });
        Ok(self)
    }

    /// Compute row-over-row differences for `stats`.
    ///
    /// Replaces any deltas computed earlier.
    pub fn with_deltas(mut self, stats: &[FitStatistic]) -> Result<Self> {
        let mut columns = Vec::with_capacity(stats.len());
        for stat in stats {
            let col = self.column_index(*stat).ok_or_else(|| MultiGroupError::MissingStatistic {
                label: "comparison table".to_string(),
                statistic: stat.name().to_string(),
            })?;
            columns.push(col);
        }

        let previous: Vec<Option<Vec<f64>>> = std::iter::once(None)
            .chain(self.rows.iter().map(|r| Some(r.values.clone())))
            .collect();
        for (row, prev) in self.rows.iter_mut().zip(previous) {
            row.deltas = columns
                .iter()
                .map(|&col| prev.as_ref().map(|p| row.values[col] - p[col]))
                .collect();
        }
        self.delta_statistics = stats.to_vec();
        Ok(self)
    }

    fn column_index(&self, stat: FitStatistic) -> Option<usize> {
        self.statistics.iter().position(|s| *s == stat)
    }

    pub fn statistics(&self) -> &[FitStatistic] {
        &self.statistics
    }

    pub fn delta_statistics(&self) -> &[FitStatistic] {
        &self.delta_statistics
    }

    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.label.as_str())
    }

    pub fn row(&self, label: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    pub fn value(&self, label: &str, stat: FitStatistic) -> Option<f64> {
        let col = self.column_index(stat)?;
        self.row(label).map(|r| r.values[col])
    }

    /// Delta of `stat` at `label`. None for the first row, or when no delta
    /// was computed for `stat`.
    pub fn delta(&self, label: &str, stat: FitStatistic) -> Option<f64> {
        let idx = self.delta_statistics.iter().position(|s| *s == stat)?;
        self.row(label)?.deltas[idx]
    }

    /// All values of one statistic, in row order.
    pub fn column(&self, stat: FitStatistic) -> Option<Vec<f64>> {
        let col = self.column_index(stat)?;
        Some(self.rows.iter().map(|r| r.values[col]).collect())
    }
}
