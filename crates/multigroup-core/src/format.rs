// =============================================================================
// Presentation Formatting
// =============================================================================
//
// Turns a Comparison Table into rows of display strings: column labels,
// fixed decimals per statistic, integer counts, floored p-values and Δ
// columns. The result prints as a Markdown pipe table or serializes to JSON;
// typesetting into a document is left to the caller.
//
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::ComparisonTable;
use crate::extract::GroupRecord;
use crate::stats::inference::significance_stars;
use crate::stats::FitStatistic;

/// Display options for comparison tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableFormat {
    /// Column labels by statistic. Unlisted statistics use their key name.
    pub labels: BTreeMap<FitStatistic, String>,
    /// Decimal places by statistic.
    pub decimals: BTreeMap<FitStatistic, usize>,
    /// Default: 3
    pub default_decimals: usize,
    /// P-values below this are shown as "< floor".
    /// Default: 0.001
    pub pvalue_floor: f64,
    /// Write ".052" instead of "0.052".
    /// Default: false
    pub drop_leading_zero: bool,
    /// Append significance stars to p-values.
    /// Default: false
    pub stars: bool,
    /// Header of the label column.
    /// Default: "group"
    pub group_header: String,
}

impl Default for TableFormat {
    fn default() -> Self {
        Self {
            labels: BTreeMap::new(),
            decimals: BTreeMap::new(),
            default_decimals: 3,
            pvalue_floor: 0.001,
            drop_leading_zero: false,
            stars: false,
            group_header: "group".to_string(),
        }
    }
}

fn strip_leading_zero(s: String) -> String {
    if let Some(rest) = s.strip_prefix("0.") {
        format!(".{rest}")
    } else if let Some(rest) = s.strip_prefix("-0.") {
        format!("-.{rest}")
    } else {
        s
    }
}

impl TableFormat {
    /// Conventional labels for a journal-style fit table.
    pub fn apa() -> Self {
        let labels = [
            (FitStatistic::ChiSquare, "χ²"),
            (FitStatistic::ChiSquareScaled, "χ² (scaled)"),
            (FitStatistic::PValue, "p"),
            (FitStatistic::Cfi, "CFI"),
            (FitStatistic::Tli, "TLI"),
            (FitStatistic::Rmsea, "RMSEA"),
            (FitStatistic::RmseaCiLower, "RMSEA 90% CI lower"),
            (FitStatistic::RmseaCiUpper, "RMSEA 90% CI upper"),
            (FitStatistic::Srmr, "SRMR"),
        ]
        .into_iter()
        .map(|(stat, label)| (stat, label.to_string()))
        .collect();
        Self {
            labels,
            drop_leading_zero: true,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, stat: FitStatistic, label: impl Into<String>) -> Self {
        self.labels.insert(stat, label.into());
        self
    }

    pub fn with_decimals(mut self, stat: FitStatistic, decimals: usize) -> Self {
        self.decimals.insert(stat, decimals);
        self
    }

    pub fn label(&self, stat: FitStatistic) -> String {
        self.labels
            .get(&stat)
            .cloned()
            .unwrap_or_else(|| stat.name().to_string())
    }

    fn number(&self, stat: FitStatistic, value: f64) -> String {
        if !value.is_finite() {
            return "NA".to_string();
        }
        if stat.is_count() {
            return format!("{value:.0}");
        }
        let decimals = self.decimals.get(&stat).copied().unwrap_or(self.default_decimals);
        let s = format!("{value:.decimals$}");
        if self.drop_leading_zero {
            strip_leading_zero(s)
        } else {
            s
        }
    }

    /// Display string for one cell.
    pub fn format_value(&self, stat: FitStatistic, value: f64) -> String {
        if stat.is_pvalue() && value.is_finite() {
            let stars = if self.stars { significance_stars(value) } else { "" };
            if value < self.pvalue_floor {
                // floor is always written without the leading zero: "< .001"
                let floor = strip_leading_zero(format!("{}", self.pvalue_floor));
                return format!("< {floor}{stars}");
            }
            return format!("{}{}", self.number(stat, value), stars);
        }
        self.number(stat, value)
    }

    /// Display string for a delta cell; empty where there is no delta.
    pub fn format_delta(&self, stat: FitStatistic, delta: Option<f64>) -> String {
        delta.map(|d| self.number(stat, d)).unwrap_or_default()
    }

    pub fn header(&self, table: &ComparisonTable) -> Vec<String> {
        std::iter::once(self.group_header.clone())
            .chain(table.statistics().iter().map(|s| self.label(*s)))
            .chain(table.delta_statistics().iter().map(|s| format!("Δ{}", self.label(*s))))
            .collect()
    }

    pub fn render(&self, table: &ComparisonTable) -> DisplayTable {
        let rows = table
            .rows()
            .iter()
            .map(|row| {
                std::iter::once(row.label().to_string())
                    .chain(
                        table
                            .statistics()
                            .iter()
                            .zip(row.values())
                            .map(|(s, v)| self.format_value(*s, *v)),
                    )
                    .chain(
                        table
                            .delta_statistics()
                            .iter()
                            .zip(row.deltas())
                            .map(|(s, d)| self.format_delta(*s, *d)),
                    )
                    .collect::<Vec<String>>()
            })
            .collect();
        DisplayTable {
            header: self.header(table),
            rows,
        }
    }

    /// Render a per-group table with failed groups shown in place.
    ///
    /// Rows follow `records`; a failed group gets "failed: <reason>" in the
    /// first value column and empty cells elsewhere.
    pub fn render_batch(&self, table: &ComparisonTable, records: &[GroupRecord]) -> DisplayTable {
        let rendered = self.render(table);
        let width = rendered.header.len();
        let rows = records
            .iter()
            .filter_map(|record| match record {
                GroupRecord::Fitted(r) => rendered
                    .rows
                    .iter()
                    .find(|row| row.first().map(String::as_str) == Some(r.label()))
                    .cloned(),
                GroupRecord::Failed { label, reason } => {
                    let mut row = vec![String::new(); width.max(2)];
                    row[0] = label.clone();
                    row[1] = format!("failed: {reason}");
                    Some(row)
                }
            })
            .collect();
        DisplayTable {
            header: rendered.header,
            rows,
        }
    }
}

/// Rows of display strings, header first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|")
}

impl fmt::Display for DisplayTable {
    /// Markdown pipe table with padded columns.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header: Vec<String> = self.header.iter().map(|h| escape_cell(h)).collect();
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| r.iter().map(|c| escape_cell(c)).collect())
            .collect();

        let ncols = rows.iter().map(Vec::len).chain([header.len()]).max().unwrap_or(0);
        let mut widths = vec![3usize; ncols];
        for line in std::iter::once(&header).chain(&rows) {
            for (w, cell) in widths.iter_mut().zip(line) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let write_line = |f: &mut fmt::Formatter<'_>, cells: &[String]| -> fmt::Result {
            write!(f, "|")?;
            for (i, w) in widths.iter().enumerate() {
                let cell = cells.get(i).map(String::as_str).unwrap_or("");
                let pad = w - cell.chars().count();
                write!(f, " {}{} |", cell, " ".repeat(pad))?;
            }
            writeln!(f)
        };

        write_line(f, &header)?;
        write!(f, "|")?;
        for w in &widths {
            write!(f, "{}|", "-".repeat(w + 2))?;
        }
        writeln!(f)?;
        for row in &rows {
            write_line(f, row)?;
        }
        Ok(())
    }
}
