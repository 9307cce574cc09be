mod batch;
mod catalog;
mod coarsen;
mod population;
mod relation;
mod weight;

pub use batch::{BatchOutcome, CoarseGrid, CoarsenOptions, IndicatorBatch, IndicatorOutput};
pub use catalog::{denominator_for_units, IndicatorCatalog, IndicatorKind, IndicatorSpec, RATE_INDICATORS};
pub use coarsen::{defined_sum, FineLattice, MaskPolicy};
pub use population::{FineCell, PopulationTable, RegionAssigner};
pub use relation::{IndicatorQuery, IndicatorRecord, IndicatorRelation, IndicatorSource, IndicatorTable};
pub use weight::{WeightedCell, WeightedPopulation};
