//! Format-specific reading and writing, organized by format rather than domain.
//!
//! - `csv` - CSV tables for grids, indicator values and outputs
//! - `parquet` - Parquet tables (requires `parquet` feature)
//! - `frame` - conversions between pipeline values and DataFrames
//! - `geojson` - GeoJSON export of fishnet layers

use std::path::Path;

use anyhow::Result;
use polars::frame::DataFrame;

mod csv;
mod frame;
mod geojson;

#[cfg(feature = "parquet")]
mod parquet;

pub use csv::{read_csv, read_csv_string, write_csv, write_csv_string};
pub use frame::{
    coarse_grid_to_frame, fishnet_to_frame, population_from_frame, records_from_frame, records_to_frame,
    weights_to_frame,
};
pub use geojson::write_json;

#[cfg(feature = "parquet")]
pub use parquet::{read_parquet, write_parquet};

fn is_parquet(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"))
}

#[cfg(not(feature = "parquet"))]
fn read_parquet(path: &Path) -> Result<DataFrame> {
    anyhow::bail!("[io] reading {} needs the `parquet` feature", path.display())
}

#[cfg(not(feature = "parquet"))]
fn write_parquet(_df: &mut DataFrame, path: &Path) -> Result<()> {
    anyhow::bail!("[io] writing {} needs the `parquet` feature", path.display())
}

/// Read a table, choosing Parquet or CSV from the file extension.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    if is_parquet(path) { read_parquet(path) } else { read_csv(path) }
}

/// Write a table, choosing Parquet or CSV from the file extension.
pub fn write_table(df: &mut DataFrame, path: &Path) -> Result<()> {
    if is_parquet(path) { write_parquet(df, path) } else { write_csv(df, path) }
}
