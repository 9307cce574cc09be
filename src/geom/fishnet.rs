use geo::{coord, Polygon, Rect};
use rayon::prelude::*;
use rstar::{Envelope, PointDistance, RTree, RTreeObject, AABB};
use tracing::info;

use crate::grid::{CellValue, Crs, RasterGrid};

/// One raster cell as a rectangle centred on the cell coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonCell<T> {
    pub x: f64,
    pub y: f64,
    pub polygon: Polygon<f64>,
    pub value: T,
}

/// Vector layer of raster cells, ready to hand to a spatial join.
#[derive(Debug, Clone)]
pub struct Fishnet<T> {
    cells: Vec<PolygonCell<T>>,
    rtree: RTree<CellEnvelope>,
    crs: Crs,
}

impl<T: CellValue> Fishnet<T> {
    /// Build one polygon per cell. Cells are enumerated column by column
    /// (every `y` of the first `x`, then the next `x`); columns are built in parallel.
    pub fn from_grid(grid: &RasterGrid<T>) -> Self {
        let (rx, ry) = grid.resolution();
        let (half_width, half_height) = (rx.abs() / 2.0, ry.abs() / 2.0);

        let cells = grid.x().par_iter().enumerate()
            .flat_map_iter(|(col, &x)| {
                grid.y().iter().enumerate().map(move |(row, &y)| PolygonCell {
                    x,
                    y,
                    polygon: cell_rect(x, y, half_width, half_height).to_polygon(),
                    value: grid.values()[(row, col)],
                })
            })
            .collect::<Vec<_>>();

        let rtree = RTree::bulk_load(
            cells.iter().enumerate()
                .map(|(i, cell)| CellEnvelope::new(i, cell_rect(cell.x, cell.y, half_width, half_height)))
                .collect()
        );

        info!("built fishnet of {} cells", cells.len());
        Self { cells, rtree, crs: grid.crs().clone() }
    }
}

impl<T> Fishnet<T> {
    #[inline] pub fn len(&self) -> usize { self.cells.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.cells.is_empty() }

    #[inline] pub fn cells(&self) -> &[PolygonCell<T>] { &self.cells }

    #[inline] pub fn crs(&self) -> &Crs { &self.crs }

    /// Indices of cells whose rectangles intersect `bounds`, in ascending order.
    pub fn query(&self, bounds: Rect<f64>) -> Vec<usize> {
        let envelope = AABB::from_corners(bounds.min().into(), bounds.max().into());
        let mut indices = self.rtree.locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.idx)
            .collect::<Vec<_>>();
        indices.sort_unstable();
        indices
    }

    /// Index of the cell containing the point `(x, y)`. A point on a shared
    /// edge belongs to the cell with the lowest index.
    pub fn locate(&self, x: f64, y: f64) -> Option<usize> {
        self.rtree.locate_all_at_point(&[x, y])
            .map(|entry| entry.idx)
            .min()
    }
}

/// R-tree entry of one fishnet cell.
#[derive(Debug, Clone)]
struct CellEnvelope {
    idx: usize,
    envelope: AABB<[f64; 2]>,
}

impl CellEnvelope {
    fn new(idx: usize, rect: Rect<f64>) -> Self {
        Self { idx, envelope: AABB::from_corners(rect.min().into(), rect.max().into()) }
    }
}

impl RTreeObject for CellEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope { self.envelope }
}

impl PointDistance for CellEnvelope {
    fn distance_2(&self, point: &[f64; 2]) -> f64 { self.envelope.distance_2(point) }

    fn contains_point(&self, point: &[f64; 2]) -> bool { self.envelope.contains_point(point) }
}

#[inline]
fn cell_rect(x: f64, y: f64, half_width: f64, half_height: f64) -> Rect<f64> {
    Rect::new(
        coord! { x: x - half_width, y: y - half_height },
        coord! { x: x + half_width, y: y + half_height },
    )
}
