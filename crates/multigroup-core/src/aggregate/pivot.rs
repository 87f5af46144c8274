//! Long and wide reshapes of a comparison table.
//!
//! Long form is one (group, statistic, value) triple per cell. Wide form puts
//! statistics down the side and groups across the top, for side-by-side
//! presentation of independent per-group fits. Both directions move values
//! without touching them.

use serde::Serialize;

use super::ComparisonTable;
use crate::error::{MultiGroupError, Result};
use crate::extract::FitRecord;
use crate::stats::FitStatistic;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongEntry {
    pub group: String,
    pub statistic: FitStatistic,
    pub value: f64,
}

/// Statistic rows × group columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WideTable {
    groups: Vec<String>,
    statistics: Vec<FitStatistic>,
    /// `cells[statistic][group]`; None where the long form had no entry.
    cells: Vec<Vec<Option<f64>>>,
}

impl ComparisonTable {
    /// One entry per cell, row by row. Deltas are not included.
    pub fn to_long(&self) -> Vec<LongEntry> {
        self.rows
            .iter()
            .flat_map(|row| {
                self.statistics
                    .iter()
                    .zip(&row.values)
                    .map(move |(stat, value)| LongEntry {
                        group: row.label.clone(),
                        statistic: *stat,
                        value: *value,
                    })
            })
            .collect()
    }

    pub fn to_wide(&self) -> WideTable {
        let cells = (0..self.statistics.len())
            .map(|s| self.rows.iter().map(|row| Some(row.values[s])).collect())
            .collect();
        WideTable {
            groups: self.rows.iter().map(|r| r.label.clone()).collect(),
            statistics: self.statistics.clone(),
            cells,
        }
    }
}

impl WideTable {
    /// Groups and statistics appear in first-seen order. A repeated
    /// (group, statistic) pair is rejected.
    pub fn from_long(entries: &[LongEntry]) -> Result<Self> {
        let mut table = WideTable {
            groups: Vec::new(),
            statistics: Vec::new(),
            cells: Vec::new(),
        };

        for entry in entries {
            let g = match table.groups.iter().position(|g| *g == entry.group) {
                Some(g) => g,
                None => {
                    table.groups.push(entry.group.clone());
                    for row in &mut table.cells {
                        row.push(None);
                    }
                    table.groups.len() - 1
                }
            };
            let s = match table.statistics.iter().position(|s| *s == entry.statistic) {
                Some(s) => s,
                None => {
                    table.statistics.push(entry.statistic);
                    table.cells.push(vec![None; table.groups.len()]);
                    table.statistics.len() - 1
                }
            };

            let cell = &mut table.cells[s][g];
            if cell.is_some() {
                return Err(MultiGroupError::DuplicateLabel(format!(
                    "{} / {}",
                    entry.group, entry.statistic
                )));
            }
            *cell = Some(entry.value);
        }
        Ok(table)
    }

    /// Back to one entry per filled cell, group by group.
    pub fn to_long(&self) -> Vec<LongEntry> {
        let mut out = Vec::new();
        for (g, group) in self.groups.iter().enumerate() {
            for (s, stat) in self.statistics.iter().enumerate() {
                if let Some(value) = self.cells[s][g] {
                    out.push(LongEntry {
                        group: group.clone(),
                        statistic: *stat,
                        value,
                    });
                }
            }
        }
        out
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn statistics(&self) -> &[FitStatistic] {
        &self.statistics
    }

    pub fn get(&self, group: &str, stat: FitStatistic) -> Option<f64> {
        let g = self.groups.iter().position(|x| x == group)?;
        let s = self.statistics.iter().position(|x| *x == stat)?;
        self.cells[s][g]
    }

    /// Rebuild the row-per-group table. Every group needs every statistic.
    pub fn to_comparison_table(&self) -> Result<ComparisonTable> {
        let records = self
            .groups
            .iter()
            .enumerate()
            .map(|(g, group)| {
                let missing: Vec<String> = self
                    .statistics
                    .iter()
                    .enumerate()
                    .filter(|(s, _)| self.cells[*s][g].is_none())
                    .map(|(_, stat)| stat.name().to_string())
                    .collect();
                if !missing.is_empty() {
                    return Err(MultiGroupError::SchemaMismatch {
                        label: group.clone(),
                        missing,
                        extra: Vec::new(),
                    });
                }
                let entries = self
                    .statistics
                    .iter()
                    .enumerate()
                    .filter_map(|(s, stat)| self.cells[s][g].map(|v| (*stat, v)))
                    .collect();
                FitRecord::new(group.clone(), entries)
            })
            .collect::<Result<Vec<_>>>()?;
        ComparisonTable::aggregate(records)
    }
}
