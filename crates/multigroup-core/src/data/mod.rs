// =============================================================================
// Datasets
// =============================================================================
//
// A `Dataset` is an ordered list of records, each mapping a variable name to
// a numeric value, a category label, or a missing marker. The pipeline only
// ever reads a dataset: partitioning and filtering produce new datasets with
// cloned rows in the original order.
//
// =============================================================================

mod loader;
pub mod partition;

pub use partition::{partition, partition_by, GroupRule, Partition, Selector};

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{MultiGroupError, Result};

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Category(String),
    Missing,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl From<f64> for Value {
    /// Non-finite numbers are stored as missing.
    fn from(v: f64) -> Self {
        if v.is_finite() {
            Value::Number(v)
        } else {
            Value::Missing
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Category(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Category(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{v}"),
            Value::Category(s) => f.write_str(s),
            Value::Missing => f.write_str("NA"),
        }
    }
}

/// One row: variable name → value.
pub type Record = BTreeMap<String, Value>;

/// An ordered collection of records sharing a column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset. Every record must only use declared columns; a column
    /// absent from a record reads as missing.
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Result<Self> {
        for (i, record) in records.iter().enumerate() {
            if let Some(unknown) = record.keys().find(|k| !columns.contains(k)) {
                return Err(MultiGroupError::DimensionMismatch(format!(
                    "row {i} has undeclared column '{unknown}'"
                )));
            }
        }
        Ok(Self { columns, records })
    }

    /// Build from column names and row vectors of cells.
    pub fn from_rows<S: Into<String>>(columns: Vec<S>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut records = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(MultiGroupError::DimensionMismatch(format!(
                    "row {i} has {} cells but there are {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            records.push(columns.iter().cloned().zip(row).collect());
        }
        Ok(Self { columns, records })
    }

    /// An empty dataset with the same columns.
    pub fn empty_like(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Value of `column` in row `row`; undeclared cells read as missing.
    pub fn value(&self, row: usize, column: &str) -> &Value {
        static MISSING: Value = Value::Missing;
        self.records
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&MISSING)
    }

    fn require_column(&self, name: &str) -> Result<()> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(MultiGroupError::InvalidValue(format!("unknown variable '{name}'")))
        }
    }

    /// A numeric column with `None` for missing cells.
    ///
    /// Fails if the column is unknown or holds category labels.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        self.require_column(name)?;
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| match r.get(name).unwrap_or(&Value::Missing) {
                Value::Number(v) => Ok(Some(*v)),
                Value::Missing => Ok(None),
                Value::Category(s) => Err(MultiGroupError::InvalidValue(format!(
                    "variable '{name}' row {i}: expected a number, found '{s}'"
                ))),
            })
            .collect()
    }

    /// Distinct non-missing values of a column in first-appearance order.
    pub fn distinct_values(&self, name: &str) -> Result<Vec<Value>> {
        self.require_column(name)?;
        let mut seen: Vec<Value> = Vec::new();
        for record in &self.records {
            if let Some(v) = record.get(name) {
                if !v.is_missing() && !seen.contains(v) {
                    seen.push(v.clone());
                }
            }
        }
        Ok(seen)
    }

    /// Rows satisfying `predicate`, in original order.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool,
    {
        Self {
            columns: self.columns.clone(),
            records: self.records.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_rows(
            vec!["id", "gender", "score"],
            vec![
                vec![1.0.into(), "F".into(), 3.0.into()],
                vec![2.0.into(), "M".into(), Value::Missing],
                vec![3.0.into(), "F".into(), 5.0.into()],
                vec![4.0.into(), Value::Missing, 2.0.into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_checks_width() {
        let err = Dataset::from_rows(vec!["a", "b"], vec![vec![1.0.into()]]);
        assert!(matches!(err, Err(MultiGroupError::DimensionMismatch(_))));
    }

    #[test]
    fn test_numeric_column_with_missing() {
        let data = sample();
        assert_eq!(
            data.numeric_column("score").unwrap(),
            vec![Some(3.0), None, Some(5.0), Some(2.0)]
        );
        assert!(data.numeric_column("gender").is_err());
        assert!(data.numeric_column("nope").is_err());
    }

    #[test]
    fn test_distinct_values_first_appearance() {
        let data = sample();
        assert_eq!(
            data.distinct_values("gender").unwrap(),
            vec![Value::from("F"), Value::from("M")]
        );
    }

    #[test]
    fn test_filter_keeps_order_and_source() {
        let data = sample();
        let women = data.filter(|r| r.get("gender") == Some(&Value::from("F")));
        assert_eq!(women.len(), 2);
        assert_eq!(women.value(1, "id"), &Value::Number(3.0));
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn test_non_finite_becomes_missing() {
        assert_eq!(Value::from(f64::NAN), Value::Missing);
        assert_eq!(Value::from(f64::INFINITY), Value::Missing);
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
    }
}
