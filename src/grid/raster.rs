use std::{fmt, sync::Arc};

use geo::{coord, Rect};
use ndarray::Array2;
use polars::{prelude::NamedFrom, series::Series};
use serde::Serialize;

use crate::error::GridError;

/// Coordinate-reference tag carried by grids and layers, e.g. `"EPSG:4326"`.
/// Only compared for equality, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Crs(Arc<str>);

impl Crs {
    pub fn new(tag: &str) -> Self { Self(Arc::from(tag.trim())) }

    /// `EPSG:<code>` tag.
    pub fn epsg(code: u32) -> Self { Self(Arc::from(format!("EPSG:{code}"))) }

    #[inline] pub fn as_str(&self) -> &str { &self.0 }

    /// Fail unless both tags are identical.
    pub fn ensure_same(&self, other: &Crs) -> Result<(), GridError> {
        if self == other { return Ok(()) }
        Err(GridError::ReferenceMismatch { left: self.to_string(), right: other.to_string() })
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Numeric cell types a grid can carry through to tables and vector layers.
pub trait CellValue: Copy + Default + PartialEq + Send + Sync + fmt::Debug + Serialize + 'static {
    fn to_f64(self) -> f64;

    /// Typed table column of cell values.
    fn into_series(name: &str, values: Vec<Self>) -> Series;
}

impl CellValue for i64 {
    #[inline] fn to_f64(self) -> f64 { self as f64 }

    fn into_series(name: &str, values: Vec<Self>) -> Series { Series::new(name.into(), values) }
}

impl CellValue for f64 {
    #[inline] fn to_f64(self) -> f64 { self }

    fn into_series(name: &str, values: Vec<Self>) -> Series { Series::new(name.into(), values) }
}

/// A regular 2-D grid of cell values with cell-centre coordinates.
///
/// Values are stored `(rows, cols)` with rows along `y` and columns along `x`.
/// Resolutions are signed: a north-up raster has a negative `y` resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid<T> {
    values: Array2<T>,
    x: Vec<f64>,
    y: Vec<f64>,
    resolution: (f64, f64),
    crs: Crs,
    nodata: Option<f64>,
}

impl<T> RasterGrid<T> {
    /// Construct a grid, checking coordinate lengths and even spacing.
    pub fn new(values: Array2<T>, x: Vec<f64>, y: Vec<f64>, resolution: (f64, f64), crs: Crs) -> Result<Self, GridError> {
        let (rows, cols) = values.dim();
        check_axis('x', &x, cols, resolution.0)?;
        check_axis('y', &y, rows, resolution.1)?;
        Ok(Self { values, x, y, resolution, crs, nodata: None })
    }

    /// Attach the source no-data sentinel.
    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Number of rows (length of the `y` axis).
    #[inline] pub fn rows(&self) -> usize { self.y.len() }

    /// Number of columns (length of the `x` axis).
    #[inline] pub fn cols(&self) -> usize { self.x.len() }

    #[inline] pub fn is_square(&self) -> bool { self.rows() == self.cols() }

    #[inline] pub fn values(&self) -> &Array2<T> { &self.values }

    #[inline] pub fn x(&self) -> &[f64] { &self.x }

    #[inline] pub fn y(&self) -> &[f64] { &self.y }

    /// Signed `(x, y)` resolution.
    #[inline] pub fn resolution(&self) -> (f64, f64) { self.resolution }

    #[inline] pub fn crs(&self) -> &Crs { &self.crs }

    #[inline] pub fn nodata(&self) -> Option<f64> { self.nodata }

    /// Bounding box of the grid, measured to the outer cell edges.
    pub fn extent(&self) -> Option<Rect<f64>> {
        let (hx, hy) = (self.resolution.0.abs() / 2.0, self.resolution.1.abs() / 2.0);
        let (x0, x1) = min_max(&self.x)?;
        let (y0, y1) = min_max(&self.y)?;
        Some(Rect::new(coord! { x: x0 - hx, y: y0 - hy }, coord! { x: x1 + hx, y: y1 + hy }))
    }

    /// Look up the cell whose centre is nearest to `(x, y)`, if it lies on the grid.
    pub fn get(&self, x: f64, y: f64) -> Option<&T> {
        let col = axis_index(&self.x, self.resolution.0, x)?;
        let row = axis_index(&self.y, self.resolution.1, y)?;
        self.values.get((row, col))
    }

    /// Apply `f` to every cell, keeping coordinates and metadata.
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> RasterGrid<U> {
        RasterGrid {
            values: self.values.map(f),
            x: self.x.clone(),
            y: self.y.clone(),
            resolution: self.resolution,
            crs: self.crs.clone(),
            nodata: self.nodata,
        }
    }

    /// Replace the values with an array of the same shape.
    pub(crate) fn with_values<U>(&self, values: Array2<U>) -> Result<RasterGrid<U>, GridError> {
        if values.dim() != self.values.dim() {
            return Err(GridError::GridMismatch(format!(
                "value shape {:?} does not match grid shape {:?}", values.dim(), self.values.dim()
            )));
        }
        Ok(RasterGrid {
            values,
            x: self.x.clone(),
            y: self.y.clone(),
            resolution: self.resolution,
            crs: self.crs.clone(),
            nodata: self.nodata,
        })
    }

    /// Fail unless `other` has the same coordinate reference and the same cell centres.
    pub fn ensure_same_lattice<U>(&self, other: &RasterGrid<U>) -> Result<(), GridError> {
        self.crs.ensure_same(&other.crs)?;
        if self.x != other.x || self.y != other.y {
            return Err(GridError::GridMismatch(format!(
                "({}, {}) grid vs ({}, {}) grid with different coordinates",
                self.rows(), self.cols(), other.rows(), other.cols()
            )));
        }
        Ok(())
    }
}

impl RasterGrid<i64> {
    /// Sum of all cells.
    #[inline] pub fn total(&self) -> i64 { self.values.sum() }

    /// Widen an integer grid back to floats.
    pub fn to_f64(&self) -> RasterGrid<f64> { self.map(|&v| v as f64) }
}

/// Even spacing is checked relative to the resolution to absorb float noise in
/// geographic coordinates.
fn check_axis(axis: char, coords: &[f64], len: usize, resolution: f64) -> Result<(), GridError> {
    let invalid = |reason: String| Err(GridError::InvalidCoordinates { axis, reason });

    if coords.len() != len {
        return invalid(format!("{} coordinates for {} cells", coords.len(), len));
    }
    if !resolution.is_finite() || resolution == 0.0 {
        return invalid(format!("resolution {resolution} must be finite and non-zero"));
    }
    if let Some(i) = coords.iter().position(|c| !c.is_finite()) {
        return invalid(format!("coordinate {i} is not finite"));
    }

    let tolerance = resolution.abs() * 1e-6;
    for (i, pair) in coords.windows(2).enumerate() {
        let step = pair[1] - pair[0];
        if (step - resolution).abs() > tolerance {
            return invalid(format!("step {step} between coordinates {i} and {} differs from resolution {resolution}", i + 1));
        }
    }
    Ok(())
}

fn axis_index(coords: &[f64], resolution: f64, value: f64) -> Option<usize> {
    let first = *coords.first()?;
    let offset = ((value - first) / resolution).round();
    (offset >= 0.0 && (offset as usize) < coords.len()).then_some(offset as usize)
}

fn min_max(coords: &[f64]) -> Option<(f64, f64)> {
    let first = *coords.first()?;
    let last = *coords.last()?;
    Some((first.min(last), first.max(last)))
}
