// ---------------------------------------------------------------------------
// CSV import
// ---------------------------------------------------------------------------

use std::io::Read;
use std::path::Path;

use log::debug;

use super::{Dataset, Record, Value};
use crate::error::{MultiGroupError, Result};

/// Cell spellings read as missing.
const MISSING_MARKERS: [&str; 4] = ["", "NA", "NaN", "."];

fn parse_cell(raw: &str) -> Value {
    let cell = raw.trim();
    if MISSING_MARKERS.contains(&cell) {
        return Value::Missing;
    }
    match cell.parse::<f64>() {
        Ok(v) => Value::from(v),
        Err(_) => Value::Category(cell.to_string()),
    }
}

impl Dataset {
    /// Read a headed CSV file.
    ///
    /// Cells that parse as numbers become `Value::Number`, the usual missing
    /// markers (`""`, `NA`, `NaN`, `.`) become `Value::Missing`, everything
    /// else is a category label. Rows with the wrong number of cells are an
    /// error.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let data = Self::from_csv_reader(file)?;
        debug!(
            "loaded {} rows x {} columns from {}",
            data.len(),
            data.columns().len(),
            path.display()
        );
        Ok(data)
    }

    /// Read headed CSV from any reader.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() {
            return Err(MultiGroupError::EmptyInput("CSV has no header row".to_string()));
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(MultiGroupError::InvalidValue(format!(
                    "CSV header repeats column '{name}'"
                )));
            }
        }

        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            let record: Record = columns
                .iter()
                .cloned()
                .zip(row.iter().map(parse_cell))
                .collect();
            records.push(record);
        }

        Ok(Self { columns, records })
    }
}
