use anyhow::{anyhow, ensure, Context, Result};
use ndarray::Array2;
use polars::{frame::DataFrame, prelude::DataType};

use crate::grid::{Crs, RasterGrid};

/// External raster provider: dimensions, resolution, reference tag, no-data
/// sentinel, and bulk retrieval of values.
pub trait GridSource {
    /// `(rows, cols)` of the grid.
    fn dims(&self) -> (usize, usize);

    /// Signed `(x, y)` resolution.
    fn resolution(&self) -> (f64, f64);

    fn crs(&self) -> &Crs;

    fn nodata(&self) -> Option<f64>;

    /// Read every cell. Cells equal to the no-data sentinel come back as NaN.
    fn read(&self) -> Result<RasterGrid<f64>>;
}

impl GridSource for RasterGrid<f64> {
    fn dims(&self) -> (usize, usize) { (self.rows(), self.cols()) }
    fn resolution(&self) -> (f64, f64) { RasterGrid::resolution(self) }
    fn crs(&self) -> &Crs { RasterGrid::crs(self) }
    fn nodata(&self) -> Option<f64> { RasterGrid::nodata(self) }

    fn read(&self) -> Result<RasterGrid<f64>> {
        let nodata = RasterGrid::nodata(self);
        Ok(self.map(|&v| if Some(v) == nodata { f64::NAN } else { v }))
    }
}

/// A raster delivered as a long table of `(x, y, value)` cell centres.
///
/// The lattice spans the full extent of the listed centres; cells absent from
/// the table are missing.
#[derive(Debug, Clone)]
pub struct TableGrid {
    x: Vec<f64>,
    y: Vec<f64>,
    cells: Vec<(usize, usize, f64)>,
    resolution: (f64, f64),
    crs: Crs,
    nodata: Option<f64>,
}

impl TableGrid {
    /// Index a DataFrame's `x_col`, `y_col`, `value_col` columns onto a lattice
    /// with the given signed resolution.
    pub fn from_dataframe(df: &DataFrame, x_col: &str, y_col: &str, value_col: &str,
        resolution: (f64, f64), crs: Crs, nodata: Option<f64>,
    ) -> Result<Self> {
        let column = |name: &str| -> Result<Vec<f64>> {
            let col = df.column(name)
                .with_context(|| format!("[grid::source] missing column {name:?}"))?
                .cast(&DataType::Float64)?;
            Ok(col.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        };
        let (xs, ys, values) = (column(x_col)?, column(y_col)?, column(value_col)?);
        ensure!(!xs.is_empty(), "[grid::source] grid table has no rows");

        let x = lattice_axis(&xs, resolution.0).context("[grid::source] x axis")?;
        let y = lattice_axis(&ys, resolution.1).context("[grid::source] y axis")?;

        let cells = xs.iter().zip(&ys).zip(&values)
            .map(|((&cx, &cy), &v)| {
                let col = ((cx - x[0]) / resolution.0).round() as usize;
                let row = ((cy - y[0]) / resolution.1).round() as usize;
                (row, col, v)
            })
            .collect();

        Ok(Self { x, y, cells, resolution, crs, nodata })
    }
}

impl GridSource for TableGrid {
    fn dims(&self) -> (usize, usize) { (self.y.len(), self.x.len()) }
    fn resolution(&self) -> (f64, f64) { self.resolution }
    fn crs(&self) -> &Crs { &self.crs }
    fn nodata(&self) -> Option<f64> { self.nodata }

    fn read(&self) -> Result<RasterGrid<f64>> {
        let mut values = Array2::from_elem(self.dims(), f64::NAN);
        for &(row, col, v) in &self.cells {
            values[(row, col)] = if Some(v) == self.nodata { f64::NAN } else { v };
        }
        Ok(RasterGrid::new(values, self.x.clone(), self.y.clone(), self.resolution, self.crs.clone())?
            .with_nodata(self.nodata))
    }
}

/// Evenly spaced axis from the extreme coordinates, ordered by the sign of the resolution.
fn lattice_axis(coords: &[f64], resolution: f64) -> Result<Vec<f64>> {
    ensure!(resolution.is_finite() && resolution != 0.0, "resolution {resolution} must be finite and non-zero");
    let lo = coords.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = coords.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return Err(anyhow!("coordinates must be finite"));
    }

    let start = if resolution > 0.0 { lo } else { hi };
    let len = ((hi - lo) / resolution.abs()).round() as usize + 1;
    let axis = (0..len).map(|i| start + i as f64 * resolution).collect::<Vec<_>>();

    let tolerance = resolution.abs() * 1e-6;
    for &c in coords {
        let offset = (c - start) / resolution;
        ensure!((offset - offset.round()).abs() * resolution.abs() <= tolerance,
            "coordinate {c} is off the {resolution} lattice starting at {start}");
    }
    Ok(axis)
}
