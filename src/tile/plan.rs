use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{GridError, TilingViolation};

/// Boundary indices `0, tile, 2·tile, …, total` of non-overlapping tiles.
pub fn non_overlapping_tiles(total: usize, tile: usize) -> Vec<usize> {
    if tile == 0 { return vec![0] }
    (0..=total).step_by(tile).collect()
}

/// Validated chunk/window layout over a square grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilingPlan {
    side: usize,
    window: usize,
    chunk: usize,
}

/// Index ranges of one chunk (rows, cols).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRange {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl TilingPlan {
    /// Check every tiling constraint and report all violations together.
    pub fn new(rows: usize, cols: usize, window: usize, chunk: usize) -> Result<Self, GridError> {
        let side = rows;
        let mut violations = Vec::new();

        if rows != cols {
            violations.push(TilingViolation::NotSquare { rows, cols });
        }
        if window == 0 {
            violations.push(TilingViolation::ZeroWindow);
        }
        if chunk == 0 {
            violations.push(TilingViolation::ZeroChunk);
        }
        if window > 0 && chunk > 0 && chunk % window != 0 {
            violations.push(TilingViolation::ChunkNotMultipleOfWindow { chunk, window });
        }
        if chunk > 0 && side % chunk != 0 {
            violations.push(TilingViolation::SideNotMultipleOfChunk { side, chunk });
        }
        if window > 0 && side % window != 0 {
            violations.push(TilingViolation::SideNotMultipleOfWindow { side, window });
        }

        if !violations.is_empty() {
            return Err(GridError::Configuration { violations });
        }
        Ok(Self { side, window, chunk })
    }

    #[inline] pub fn side(&self) -> usize { self.side }
    #[inline] pub fn window(&self) -> usize { self.window }
    #[inline] pub fn chunk(&self) -> usize { self.chunk }

    /// Chunk boundaries over the whole grid.
    pub fn chunk_bounds(&self) -> Vec<usize> { non_overlapping_tiles(self.side, self.chunk) }

    /// Window boundaries relative to the start of a chunk.
    pub fn window_bounds(&self) -> Vec<usize> { non_overlapping_tiles(self.chunk, self.window) }

    /// Every chunk of the grid, row-major.
    pub fn chunks(&self) -> Vec<ChunkRange> {
        let bounds = self.chunk_bounds();
        bounds.windows(2)
            .flat_map(|r| bounds.windows(2).map(move |c| ChunkRange { rows: r[0]..r[1], cols: c[0]..c[1] }))
            .collect()
    }

    /// Number of records a full reduction produces: `(side / window)²`.
    #[inline] pub fn record_count(&self) -> usize { (self.side / self.window).pow(2) }
}
