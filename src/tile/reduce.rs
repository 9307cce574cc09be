use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use ndarray::{s, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::GridError,
    grid::RasterGrid,
    report::ConservationCheck,
    tile::TilingPlan,
};

/// One summarized window: coordinate centroid and summed population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub x: f64,
    pub y: f64,
    pub population: i64,
}

/// Output of a tiled reduction.
#[derive(Debug, Clone)]
pub struct ReducedRaster {
    /// One record per window; order is unspecified.
    pub records: Vec<AggregatedRecord>,
    pub check: ConservationCheck,
}

impl ReducedRaster {
    #[inline] pub fn total(&self) -> i64 { self.records.iter().map(|r| r.population).sum() }
}

/// Cooperative cancellation for a running reduction.
/// Chunks already in flight finish; chunks not yet started are skipped.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self { Self::default() }

    #[inline] pub fn abort(&self) { self.0.store(true, Ordering::Relaxed) }

    #[inline] pub fn is_aborted(&self) -> bool { self.0.load(Ordering::Relaxed) }
}

/// Borrowed view of one chunk and its coordinates; the unit of parallel work.
struct ChunkTask<'a> {
    values: ArrayView2<'a, i64>,
    x: &'a [f64],
    y: &'a [f64],
}

/// Reduces a square grid by summing non-overlapping windows on a worker pool.
#[derive(Debug, Clone)]
pub struct TileAggregator {
    window: usize,
    chunk: usize,
    workers: usize,
}

impl TileAggregator {
    pub fn new(window: usize, chunk: usize, workers: usize) -> Self {
        Self { window, chunk, workers }
    }

    /// Reduce `grid`, waiting for every chunk.
    pub fn reduce(&self, grid: &RasterGrid<i64>) -> Result<ReducedRaster, GridError> {
        self.reduce_with_abort(grid, &AbortHandle::new())
    }

    /// Reduce `grid`, stopping early with [`GridError::Aborted`] once `abort` is raised.
    pub fn reduce_with_abort(&self, grid: &RasterGrid<i64>, abort: &AbortHandle) -> Result<ReducedRaster, GridError> {
        let plan = TilingPlan::new(grid.rows(), grid.cols(), self.window, self.chunk)?;
        let windows = plan.window_bounds();

        let tasks = plan.chunks().into_iter()
            .map(|c| ChunkTask {
                values: grid.values().slice(s![c.rows.clone(), c.cols.clone()]),
                x: &grid.x()[c.cols],
                y: &grid.y()[c.rows],
            })
            .collect::<Vec<_>>();

        info!(
            "reducing ({side}, {side}) grid: {} chunks of {} cells, window {}, {} workers",
            tasks.len(), plan.chunk(), plan.window(), self.workers, side = plan.side()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("tile-worker-{i}"))
            .build()?;

        let outputs = pool.install(|| {
            tasks.par_iter()
                .map(|task| {
                    if abort.is_aborted() { return Err(GridError::Aborted) }
                    Ok(aggregate_chunk(task, &windows))
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        let records = outputs.into_iter().flatten().collect::<Vec<_>>();
        debug_assert_eq!(records.len(), plan.record_count());

        let check = ConservationCheck::exact(
            "tile",
            grid.total(),
            records.iter().map(|r| r.population).sum(),
        ).logged();

        info!("reduced to {} records", records.len());
        Ok(ReducedRaster { records, check })
    }
}

/// Summarize every window of one chunk, row-major over the chunk's window grid.
fn aggregate_chunk(task: &ChunkTask<'_>, windows: &[usize]) -> Vec<AggregatedRecord> {
    let mut out = Vec::with_capacity((windows.len() - 1).pow(2));
    for r in windows.windows(2) {
        let y = mean(&task.y[r[0]..r[1]]);
        for c in windows.windows(2) {
            out.push(AggregatedRecord {
                x: mean(&task.x[c[0]..c[1]]),
                y,
                population: task.values.slice(s![r[0]..r[1], c[0]..c[1]]).sum(),
            });
        }
    }
    debug!("aggregated chunk into {} windows", out.len());
    out
}

#[inline]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::TilingViolation, grid::Crs};
    use ndarray::{array, Array2};

    fn grid(values: Array2<i64>) -> RasterGrid<i64> {
        let (rows, cols) = values.dim();
        RasterGrid::new(
            values,
            (0..cols).map(|i| i as f64).collect(),
            (0..rows).map(|i| 10.0 - i as f64).collect(),
            (1.0, -1.0),
            Crs::epsg(4326),
        ).unwrap()
    }

    fn sorted_populations(reduced: &ReducedRaster) -> Vec<i64> {
        let mut pops = reduced.records.iter().map(|r| r.population).collect::<Vec<_>>();
        pops.sort_unstable();
        pops
    }

    #[test]
    fn four_by_four_scenario() {
        let g = grid(array![[1, 2, 0, 3], [0, 0, 1, 1], [2, 2, 2, 2], [0, 1, 0, 0]]);
        let reduced = TileAggregator::new(2, 4, 2).reduce(&g).unwrap();

        assert_eq!(reduced.records.len(), 4);
        assert_eq!(sorted_populations(&reduced), vec![3, 4, 5, 5]);
        assert_eq!(reduced.total(), 17);
        assert!(reduced.check.passed());

        let top_left = reduced.records.iter().find(|r| r.x == 0.5 && r.y == 9.5).unwrap();
        assert_eq!(top_left.population, 3);
        let bottom_right = reduced.records.iter().find(|r| r.x == 2.5 && r.y == 7.5).unwrap();
        assert_eq!(bottom_right.population, 4);
    }

    #[test]
    fn same_result_for_any_chunking_and_worker_count() {
        let values = Array2::from_shape_fn((12, 12), |(r, c)| ((r * 7 + c * 3) % 5) as i64);
        let g = grid(values);

        let baseline = TileAggregator::new(2, 12, 1).reduce(&g).unwrap();
        for (chunk, workers) in [(2, 4), (4, 3), (6, 2), (12, 8)] {
            let reduced = TileAggregator::new(2, chunk, workers).reduce(&g).unwrap();
            assert_eq!(reduced.records.len(), 36);
            assert_eq!(reduced.total(), g.total());

            let key = |r: &AggregatedRecord| ((r.y * 10.0) as i64, (r.x * 10.0) as i64, r.population);
            let mut a = baseline.records.iter().map(key).collect::<Vec<_>>();
            let mut b = reduced.records.iter().map(key).collect::<Vec<_>>();
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn window_equal_to_side_yields_single_record() {
        let g = grid(Array2::from_elem((6, 6), 2));
        let reduced = TileAggregator::new(6, 6, 1).reduce(&g).unwrap();
        assert_eq!(reduced.records, vec![AggregatedRecord { x: 2.5, y: 7.5, population: 72 }]);
    }

    #[test]
    fn bad_parameters_fail_before_work() {
        let g = grid(Array2::zeros((6, 6)));
        let err = TileAggregator::new(4, 5, 1).reduce(&g).unwrap_err();
        let GridError::Configuration { violations } = err else { panic!("expected configuration error") };
        assert_eq!(violations.len(), 3);
        assert!(violations.contains(&TilingViolation::SideNotMultipleOfWindow { side: 6, window: 4 }));
    }

    #[test]
    fn non_square_grid_is_rejected() {
        let g = grid(Array2::zeros((4, 6)));
        let err = TileAggregator::new(2, 2, 1).reduce(&g).unwrap_err();
        let GridError::Configuration { violations } = err else { panic!("expected configuration error") };
        assert_eq!(violations, vec![TilingViolation::NotSquare { rows: 4, cols: 6 }]);
    }

    #[test]
    fn raised_abort_stops_dispatch() {
        let g = grid(Array2::ones((8, 8)));
        let abort = AbortHandle::new();
        abort.abort();
        let err = TileAggregator::new(2, 4, 2).reduce_with_abort(&g, &abort).unwrap_err();
        assert!(matches!(err, GridError::Aborted));
    }
}
