//! CSV loading for classification datasets.
//!
//! Supported format:
//! - UTF-8, comma-separated
//! - Optional header row (auto-detected: first row is a header if it contains
//!   any non-numeric, non-empty cell)
//! - Double-quoted fields with embedded commas are handled correctly
//! - The last column is a 0-based integer class index; all other columns are
//!   numeric features

use std::path::Path;

use crate::data::dataset::Dataset;
use crate::error::{Error, Result};

/// Reads a CSV file into a `Dataset`.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    parse_csv(&bytes).map_err(|e| match e {
        Error::Dataset(msg) => Error::Dataset(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Parses CSV bytes into a `Dataset`.
pub fn parse_csv(data: &[u8]) -> Result<Dataset> {
    let text = std::str::from_utf8(data)
        .map_err(|_| Error::Dataset("CSV file is not valid UTF-8".into()))?;

    let mut lines = text.lines().peekable();

    if let Some(first) = lines.peek() {
        if is_header(first) {
            lines.next();
        }
    }

    let mut inputs: Vec<Vec<f64>> = Vec::new();
    let mut labels: Vec<usize> = Vec::new();

    for (row_idx, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let cells = parse_csv_row(line);
        let Some((label_cell, feature_cells)) = cells.split_last().filter(|(_, f)| !f.is_empty()) else {
            return Err(Error::Dataset(format!(
                "Row {}: expected at least 2 columns (features + class index), got {}",
                row_idx + 1,
                cells.len()
            )));
        };

        let feats = parse_floats(feature_cells, row_idx + 1)?;
        let class_idx: usize = label_cell.trim().parse::<usize>().map_err(|_| {
            Error::Dataset(format!(
                "Row {}: class index '{}' is not a non-negative integer",
                row_idx + 1,
                label_cell
            ))
        })?;

        inputs.push(feats);
        labels.push(class_idx);
    }

    if inputs.is_empty() {
        return Err(Error::Dataset("CSV contains no data rows after parsing".into()));
    }

    // Width consistency is checked by Dataset::new.
    Dataset::new(inputs, labels)
}

/// Returns `true` if the row looks like a header (any cell non-numeric).
fn is_header(line: &str) -> bool {
    parse_csv_row(line).iter().any(|c| {
        let t = c.trim();
        !t.is_empty() && t.parse::<f64>().is_err()
    })
}

/// Parses a single CSV row, handling double-quoted fields.
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                // escaped quote inside a quoted field
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_floats(cells: &[String], row_num: usize) -> Result<Vec<f64>> {
    cells.iter()
        .map(|c| {
            c.trim().parse::<f64>().map_err(|_| {
                Error::Dataset(format!("Row {row_num}: '{c}' is not a valid number"))
            })
        })
        .collect()
}
