use crate::{tile::AggregatedRecord, types::RegionId};

/// A fine-resolution population cell after the spatial join.
#[derive(Debug, Clone, PartialEq)]
pub struct FineCell {
    pub x: f64,
    pub y: f64,
    pub population: i64,
    /// Containing region, if the join found one.
    pub region: Option<RegionId>,
}

/// Point-in-polygon join supplied by the caller.
pub trait RegionAssigner {
    fn region_of(&self, x: f64, y: f64) -> Option<RegionId>;
}

impl<F: Fn(f64, f64) -> Option<RegionId>> RegionAssigner for F {
    fn region_of(&self, x: f64, y: f64) -> Option<RegionId> { self(x, y) }
}

/// Fine population cells keyed by region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulationTable {
    cells: Vec<FineCell>,
}

impl PopulationTable {
    pub fn new(cells: Vec<FineCell>) -> Self { Self { cells } }

    /// Attach regions to reduced records with an external join.
    pub fn join(records: &[AggregatedRecord], assigner: &impl RegionAssigner) -> Self {
        Self {
            cells: records.iter()
                .map(|r| FineCell {
                    x: r.x,
                    y: r.y,
                    population: r.population,
                    region: assigner.region_of(r.x, r.y),
                })
                .collect(),
        }
    }

    #[inline] pub fn len(&self) -> usize { self.cells.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.cells.is_empty() }

    #[inline] pub fn cells(&self) -> &[FineCell] { &self.cells }

    /// Total population over all cells, joined or not.
    pub fn total(&self) -> i64 { self.cells.iter().map(|c| c.population).sum() }

    /// Cells the join could not place in any region.
    pub fn unassigned(&self) -> usize { self.cells.iter().filter(|c| c.region.is_none()).count() }
}
