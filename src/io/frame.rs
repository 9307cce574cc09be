//! Conversions between pipeline values and Polars DataFrames.

use anyhow::{ensure, Context, Result};
use polars::{frame::DataFrame, prelude::{DataType, NamedFrom}, series::Series};

use crate::{
    geom::Fishnet,
    grid::CellValue,
    indicator::{CoarseGrid, FineCell, PopulationTable, WeightedPopulation},
    tile::AggregatedRecord,
    types::RegionId,
};

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let col = df.column(name)
        .with_context(|| format!("[io::frame] missing column {name:?}"))?
        .cast(&DataType::Float64)?;
    Ok(col.f64()?.into_iter().collect())
}

/// `(x, y, population)` table of reduced records.
pub fn records_to_frame(records: &[AggregatedRecord]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Series::new("x".into(), records.iter().map(|r| r.x).collect::<Vec<_>>()).into(),
        Series::new("y".into(), records.iter().map(|r| r.y).collect::<Vec<_>>()).into(),
        Series::new("population".into(), records.iter().map(|r| r.population).collect::<Vec<_>>()).into(),
    ])?)
}

/// Read reduced records back from an `(x, y, population)` table. Rows with a
/// missing coordinate are dropped; a missing population counts as zero.
pub fn records_from_frame(df: &DataFrame) -> Result<Vec<AggregatedRecord>> {
    let (x, y) = (f64_column(df, "x")?, f64_column(df, "y")?);
    let population = df.column("population")
        .context("[io::frame] missing column \"population\"")?
        .cast(&DataType::Int64)?;

    Ok(x.into_iter().zip(y).zip(population.i64()?.into_iter())
        .filter_map(|((x, y), population)| Some(AggregatedRecord { x: x?, y: y?, population: population.unwrap_or(0) }))
        .collect())
}

/// Fine population table from the output of an external spatial join.
///
/// Cells with an empty region column were not placed in any region.
pub fn population_from_frame(df: &DataFrame, population_col: &str, region_col: &str) -> Result<PopulationTable> {
    let (x, y) = (f64_column(df, "x")?, f64_column(df, "y")?);
    let population = f64_column(df, population_col)?;
    let regions = df.column(region_col)
        .with_context(|| format!("[io::frame] missing column {region_col:?}"))?
        .cast(&DataType::String)?;
    ensure!(x.len() == regions.len(), "[io::frame] population columns have different lengths");

    let cells = x.into_iter().zip(y).zip(population).zip(regions.str()?.into_iter())
        .filter_map(|(((x, y), population), region)| Some(FineCell {
            x: x?,
            y: y?,
            population: population.filter(|p| p.is_finite()).map_or(0, |p| p.max(0.0).floor() as i64),
            region: region.map(str::trim).filter(|r| !r.is_empty()).map(RegionId::new),
        }))
        .collect();
    Ok(PopulationTable::new(cells))
}

/// `(x, y, population, region_id, weight)` table of weighted fine cells.
pub fn weights_to_frame(weighted: &WeightedPopulation) -> Result<DataFrame> {
    let cells = weighted.cells();
    Ok(DataFrame::new(vec![
        Series::new("x".into(), cells.iter().map(|c| c.x).collect::<Vec<_>>()).into(),
        Series::new("y".into(), cells.iter().map(|c| c.y).collect::<Vec<_>>()).into(),
        Series::new("population".into(), cells.iter().map(|c| c.population).collect::<Vec<_>>()).into(),
        Series::new("region_id".into(), cells.iter().map(|c| c.region.as_ref().map(|r| r.id().to_string())).collect::<Vec<_>>()).into(),
        Series::new("weight".into(), cells.iter().map(|c| c.weight).collect::<Vec<_>>()).into(),
    ])?)
}

/// One row per coarse cell (row-major), with `x`, `y`, then one column per layer.
pub fn coarse_grid_to_frame(grid: &CoarseGrid) -> Result<DataFrame> {
    let (rows, cols) = grid.dims();
    let mut columns = Vec::with_capacity(grid.layers().len() + 2);
    columns.push(Series::new("x".into(), (0..rows).flat_map(|_| grid.x().iter().copied()).collect::<Vec<_>>()).into());
    columns.push(Series::new("y".into(), grid.y().iter().flat_map(|&y| std::iter::repeat_n(y, cols)).collect::<Vec<_>>()).into());
    for (name, values) in grid.layers() {
        columns.push(Series::new(name.as_str().into(), values.iter().copied().collect::<Vec<_>>()).into());
    }
    Ok(DataFrame::new(columns)?)
}

/// `(x, y, value)` table of fishnet cells, in fishnet order.
pub fn fishnet_to_frame<T: CellValue>(fishnet: &Fishnet<T>) -> Result<DataFrame> {
    let cells = fishnet.cells();
    Ok(DataFrame::new(vec![
        Series::new("x".into(), cells.iter().map(|c| c.x).collect::<Vec<_>>()).into(),
        Series::new("y".into(), cells.iter().map(|c| c.y).collect::<Vec<_>>()).into(),
        T::into_series("value", cells.iter().map(|c| c.value).collect()).into(),
    ])?)
}
