use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{error::IndicatorError, indicator::WeightedCell};

/// How coarse count cells become missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPolicy {
    /// Only blocks without any defined fine value are missing; zero stays zero.
    #[default]
    NoData,
    /// Also treat zero (and undefined ratios) as missing.
    ZeroIsMissing,
}

impl MaskPolicy {
    #[inline]
    pub fn apply(&self, value: Option<f64>) -> Option<f64> {
        match self {
            MaskPolicy::NoData => value,
            MaskPolicy::ZeroIsMissing => value.filter(|v| v.is_finite() && *v != 0.0),
        }
    }
}

/// Positions of fine cells on the regular lattice spanned by their coordinates.
///
/// Rows or columns with no cells (e.g. dropped by a spatial join) stay on the
/// lattice as empty positions, so blocks never merge non-adjacent cells.
#[derive(Debug, Clone)]
pub struct FineLattice {
    x: Vec<f64>,
    y: Vec<f64>,
    index: Vec<(usize, usize)>, // (row, col) per fine cell
}

impl FineLattice {
    pub fn new(cells: &[WeightedCell]) -> Self {
        let x = regular_axis(cells.iter().map(|c| c.x).collect());
        let y = regular_axis(cells.iter().map(|c| c.y).collect());
        let index = cells.iter()
            .map(|c| (nearest(&y, c.y), nearest(&x, c.x)))
            .collect();

        Self { x, y, index }
    }

    #[inline] pub fn x(&self) -> &[f64] { &self.x }

    #[inline] pub fn y(&self) -> &[f64] { &self.y }

    /// `(rows, cols)` of the full lattice.
    #[inline] pub fn dims(&self) -> (usize, usize) { (self.y.len(), self.x.len()) }

    /// `(rows, cols)` after grouping `factor × factor` lattice cells, padding partial edge blocks.
    #[inline]
    pub fn coarse_dims(&self, factor: usize) -> (usize, usize) {
        (self.y.len().div_ceil(factor), self.x.len().div_ceil(factor))
    }

    /// Coarse cell coordinates: the mean of the lattice coordinates each block covers.
    pub fn coarse_coords(&self, factor: usize) -> (Vec<f64>, Vec<f64>) {
        let block_means = |axis: &[f64]| axis.chunks(factor)
            .map(|block| block.iter().sum::<f64>() / block.len() as f64)
            .collect::<Vec<_>>();
        (block_means(&self.x), block_means(&self.y))
    }

    #[inline] pub(crate) fn position(&self, cell: usize) -> (usize, usize) { self.index[cell] }
}

/// Unique ascending coordinates, with gaps filled in at the smallest step when
/// every gap is a whole number of steps. Irregular axes are kept as they are.
fn regular_axis(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values.dedup();
    let step = values.windows(2).map(|w| w[1] - w[0]).min_by(f64::total_cmp);
    let Some(step) = step else { return values };
    if !(step.is_finite() && step > 0.0) { return values }

    let whole_steps = values.windows(2).all(|w| {
        let steps = (w[1] - w[0]) / step;
        (steps - steps.round()).abs() < 1e-6
    });
    if !whole_steps { return values }

    let (first, last) = (values[0], values[values.len() - 1]);
    let len = ((last - first) / step).round() as usize + 1;
    (0..len).map(|i| first + i as f64 * step).collect()
}

/// Index of the axis coordinate closest to `v`.
fn nearest(axis: &[f64], v: f64) -> usize {
    let i = axis.partition_point(|&a| a < v);
    if i == 0 { return 0 }
    if i == axis.len() { return i - 1 }
    if v - axis[i - 1] <= axis[i] - v { i - 1 } else { i }
}

/// Per-block sums and counts of defined fine values.
#[derive(Debug, Clone)]
pub(crate) struct BlockAccumulator {
    dims: (usize, usize),
    sums: Vec<f64>,
    counts: Vec<u32>,
}

impl BlockAccumulator {
    /// Accumulate `values` (aligned with the lattice's fine cells) into blocks of `factor`.
    pub(crate) fn accumulate(lattice: &FineLattice, factor: usize, values: &[Option<f64>], indicator: &str)
        -> Result<Self, IndicatorError>
    {
        let dims = lattice.coarse_dims(factor);
        let len = dims.0.saturating_mul(dims.1);
        let mut acc = Self {
            dims,
            sums: try_buffer(len, 0.0, indicator)?,
            counts: try_buffer(len, 0, indicator)?,
        };
        for (cell, value) in values.iter().enumerate() {
            if let Some(v) = value {
                let (row, col) = lattice.position(cell);
                let block = (row / factor) * dims.1 + col / factor;
                acc.sums[block] += v;
                acc.counts[block] += 1;
            }
        }
        Ok(acc)
    }

    /// Block sums; blocks with no defined value are missing.
    pub(crate) fn sum(&self) -> Array2<Option<f64>> {
        self.collect(|s, _| s)
    }

    /// Block means ignoring missing values.
    pub(crate) fn mean(&self) -> Array2<Option<f64>> {
        self.collect(|s, n| s / n as f64)
    }

    fn collect(&self, reduce: impl Fn(f64, u32) -> f64) -> Array2<Option<f64>> {
        let cols = self.dims.1;
        Array2::from_shape_fn(self.dims, |(r, c)| {
            let i = r * cols + c;
            (self.counts[i] > 0).then(|| reduce(self.sums[i], self.counts[i]))
        })
    }
}

/// Sum of the defined values of a coarse layer.
pub fn defined_sum(values: &Array2<Option<f64>>) -> f64 {
    values.iter().flatten().sum()
}

/// Allocate a buffer without aborting on allocation failure.
pub(crate) fn try_buffer<T: Clone>(len: usize, fill: T, indicator: &str) -> Result<Vec<T>, IndicatorError> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|_| IndicatorError::ResourceExhaustion {
        indicator: indicator.to_string(),
        estimated_bytes: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    buffer.resize(len, fill);
    Ok(buffer)
}

/// Ratio of two coarse layers; missing where either side is missing or the denominator is zero.
pub(crate) fn ratio(numerator: &Array2<Option<f64>>, denominator: &Array2<Option<f64>>) -> Array2<Option<f64>> {
    ndarray::Zip::from(numerator).and(denominator)
        .map_collect(|&n, &d| match (n, d) {
            (Some(n), Some(d)) if d != 0.0 => Some(n / d),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(coords: &[(f64, f64)]) -> Vec<WeightedCell> {
        coords.iter()
            .map(|&(x, y)| WeightedCell { x, y, population: 1, region: None, weight: Some(1.0) })
            .collect()
    }

    #[test]
    fn lattice_sorts_unique_coordinates() {
        let lattice = FineLattice::new(&cells(&[(2.0, 1.0), (0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]));
        assert_eq!(lattice.x(), &[0.0, 1.0, 2.0]);
        assert_eq!(lattice.y(), &[0.0, 1.0]);
        assert_eq!(lattice.position(0), (1, 2));
        assert_eq!(lattice.position(1), (0, 0));
    }

    #[test]
    fn lattice_keeps_empty_rows_and_columns() {
        // Column x = 1 and row y = 2 have no cells.
        let lattice = FineLattice::new(&cells(&[(0.0, 0.0), (2.0, 0.0), (3.0, 0.0), (0.0, 1.0), (0.0, 3.0)]));
        assert_eq!(lattice.x(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(lattice.y(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(lattice.position(1), (0, 2));
        assert_eq!(lattice.position(4), (3, 0));

        let values = [Some(1.0), Some(2.0), Some(4.0), Some(8.0), Some(16.0)];
        let acc = BlockAccumulator::accumulate(&lattice, 2, &values, "TEST").unwrap();
        assert_eq!(acc.sum(), Array2::from_shape_vec((2, 2), vec![Some(9.0), Some(6.0), Some(16.0), None]).unwrap());
        assert_eq!(lattice.coarse_coords(2), (vec![0.5, 2.5], vec![0.5, 2.5]));
    }

    #[test]
    fn irregular_axes_are_not_filled() {
        let lattice = FineLattice::new(&cells(&[(0.0, 0.0), (1.0, 0.0), (2.5, 0.0)]));
        assert_eq!(lattice.x(), &[0.0, 1.0, 2.5]);
        assert_eq!(lattice.position(2), (0, 2));
    }

    #[test]
    fn coarse_blocks_pad_partial_edges() {
        let coords = (0..5).flat_map(|r| (0..3).map(move |c| (c as f64, r as f64))).collect::<Vec<_>>();
        let lattice = FineLattice::new(&cells(&coords));
        assert_eq!(lattice.dims(), (5, 3));
        assert_eq!(lattice.coarse_dims(2), (3, 2));

        let (x, y) = lattice.coarse_coords(2);
        assert_eq!(x, vec![0.5, 2.0]);
        assert_eq!(y, vec![0.5, 2.5, 4.0]);
    }

    #[test]
    fn sums_and_means_ignore_missing() {
        let lattice = FineLattice::new(&cells(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]));
        let values = [Some(1.0), None, Some(3.0), Some(5.0)];
        let acc = BlockAccumulator::accumulate(&lattice, 2, &values, "TEST").unwrap();

        assert_eq!(acc.sum(), Array2::from_shape_vec((1, 2), vec![Some(1.0), Some(8.0)]).unwrap());
        assert_eq!(acc.mean(), Array2::from_shape_vec((1, 2), vec![Some(1.0), Some(4.0)]).unwrap());

        let empty = BlockAccumulator::accumulate(&lattice, 2, &[None, None, Some(0.0), None], "TEST").unwrap();
        assert_eq!(empty.sum(), Array2::from_shape_vec((1, 2), vec![None, Some(0.0)]).unwrap());
    }

    #[test]
    fn mask_policies_differ_on_zero() {
        assert_eq!(MaskPolicy::NoData.apply(Some(0.0)), Some(0.0));
        assert_eq!(MaskPolicy::ZeroIsMissing.apply(Some(0.0)), None);
        assert_eq!(MaskPolicy::ZeroIsMissing.apply(Some(f64::NAN)), None);
        assert_eq!(MaskPolicy::ZeroIsMissing.apply(Some(2.0)), Some(2.0));
        assert_eq!(MaskPolicy::NoData.apply(None), None);
    }

    #[test]
    fn ratio_is_missing_for_zero_denominator() {
        let n = Array2::from_shape_vec((1, 3), vec![Some(1.0), Some(2.0), None]).unwrap();
        let d = Array2::from_shape_vec((1, 3), vec![Some(4.0), Some(0.0), Some(1.0)]).unwrap();
        assert_eq!(ratio(&n, &d), Array2::from_shape_vec((1, 3), vec![Some(0.25), None, None]).unwrap());
    }

    #[test]
    fn oversized_buffer_reports_exhaustion() {
        let err = try_buffer(usize::MAX / 2, 0.0f64, "HUGE").unwrap_err();
        assert!(matches!(err, IndicatorError::ResourceExhaustion { ref indicator, .. } if indicator == "HUGE"));
    }
}
