use ndarray::{concatenate, Array2, Axis};
use tracing::info;

use crate::{
    error::{GridError, TilingViolation},
    grid::RasterGrid,
    report::ConservationCheck,
};

/// A grid padded out to a square, plus the conservation check for the padding.
#[derive(Debug, Clone)]
pub struct AlignedGrid {
    pub grid: RasterGrid<i64>,
    pub padded_cells: usize,
    pub check: ConservationCheck,
}

/// Side length of the smallest square covering `rows × cols`, rounded up to `multiple`.
pub fn square_side(rows: usize, cols: usize, multiple: Option<usize>) -> usize {
    let side = rows.max(cols);
    match multiple {
        Some(m) if m > 0 => side.div_ceil(m) * m,
        _ => side,
    }
}

/// Pad a grid with zeros so it becomes square with a side divisible by `multiple`.
///
/// New coordinates step outward from the last existing coordinate of each axis at
/// the grid's own resolution; the original cells keep their positions at the
/// start of both axes. A failed conservation check is returned in the result,
/// not raised.
pub fn make_divisible_square_extent(grid: &RasterGrid<i64>, multiple: Option<usize>) -> Result<AlignedGrid, GridError> {
    if multiple == Some(0) {
        return Err(GridError::Configuration { violations: vec![TilingViolation::ZeroMultiple] });
    }

    let (rows, cols) = (grid.rows(), grid.cols());
    let side = square_side(rows, cols, multiple);
    let (rx, ry) = grid.resolution();

    let x = extend_axis(grid.x(), rx, side);
    let y = extend_axis(grid.y(), ry, side);

    // Zero blocks to the right of and below the original.
    let right = Array2::<i64>::zeros((rows, side - cols));
    let below = Array2::<i64>::zeros((side - rows, side));

    let shape_error = |e: ndarray::ShapeError| GridError::GridMismatch(e.to_string());
    let widened = concatenate(Axis(1), &[grid.values().view(), right.view()]).map_err(shape_error)?;
    let values = concatenate(Axis(0), &[widened.view(), below.view()]).map_err(shape_error)?;

    let check = ConservationCheck::exact(
        "align",
        grid.total() + right.sum() + below.sum(),
        values.sum(),
    ).logged();

    let aligned = RasterGrid::new(values, x, y, (rx, ry), grid.crs().clone())?
        .with_nodata(grid.nodata());

    info!("padded ({rows}, {cols}) grid to ({side}, {side}) with multiple {multiple:?}");

    Ok(AlignedGrid {
        grid: aligned,
        padded_cells: side * side - rows * cols,
        check,
    })
}

fn extend_axis(coords: &[f64], resolution: f64, len: usize) -> Vec<f64> {
    let mut out = coords.to_vec();
    let start = coords.last().copied().unwrap_or(-resolution);
    out.extend((1..=len.saturating_sub(coords.len())).map(|i| start + i as f64 * resolution));
    out
}
