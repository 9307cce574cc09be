//! CSV reading operations.

use std::{fs, io::Cursor, path::Path, sync::Arc};

use anyhow::{Context, Result};
use polars::{frame::DataFrame, io::SerReader, prelude::{CsvReadOptions, CsvReader, DataType, Field, Schema, SchemaRef}};

/// Identifier columns that must keep their leading zeros.
const TEXT_COLUMNS: [&str; 3] = ["GEOID", "region_id", "NAME"];

/// Reads a CSV file from `path` into a Polars DataFrame.
///
/// Region identifier columns are read as strings so `"01001"` stays `"01001"`.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let bytes = fs::read(path)
        .with_context(|| format!("[io::csv::read] Failed to open CSV file: {}", path.display()))?;
    read_csv_bytes(&bytes)
        .with_context(|| format!("[io::csv::read] Failed to read CSV from {:?}", path))
}

/// Reads a CSV from a string.
pub fn read_csv_string(csv: &str) -> Result<DataFrame> {
    read_csv_bytes(csv.as_bytes())
        .with_context(|| "[io::csv::read] Failed to read CSV from string")
}

fn read_csv_bytes(bytes: &[u8]) -> Result<DataFrame> {
    let options = CsvReadOptions::default()
        .with_has_header(true)
        .with_schema_overwrite(text_schema(&header_columns(bytes)));
    Ok(CsvReader::new(Cursor::new(bytes)).with_options(options).finish()?)
}

/// Column names of the header row, unquoted.
fn header_columns(bytes: &[u8]) -> Vec<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let line = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    String::from_utf8_lossy(line)
        .trim_end_matches('\r')
        .split(',')
        .map(|name| name.trim().trim_matches('"').to_string())
        .collect()
}

/// Schema overwrite forcing the identifier columns present in `header` to strings,
/// in header order. `None` when the table has no identifier columns.
fn text_schema(header: &[String]) -> Option<SchemaRef> {
    let fields = header.iter()
        .filter(|name| TEXT_COLUMNS.contains(&name.as_str()))
        .map(|name| Field::new(name.as_str().into(), DataType::String))
        .collect::<Vec<_>>();
    (!fields.is_empty()).then(|| Arc::new(Schema::from_iter(fields)))
}
