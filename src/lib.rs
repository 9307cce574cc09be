#![doc = "popgrid public API: population grids, tiled reduction and population-weighted indicator coarsening"]
mod config;
mod error;
mod geom;
mod grid;
mod indicator;
mod pipeline;
mod report;
mod tile;
mod types;

pub mod io;

#[doc(inline)]
pub use config::{AlignmentConfig, PipelineConfig, TilingConfig, WeightsConfig};

#[doc(inline)]
pub use error::{GridError, IndicatorError, TilingViolation};

#[doc(inline)]
pub use geom::{Fishnet, PolygonCell};

#[doc(inline)]
pub use grid::{
    average_population, floor_integer, make_divisible_square_extent, square_side,
    AlignedGrid, CellValue, Crs, GridSource, PopulationLayers, RasterGrid, TableGrid,
};

#[doc(inline)]
pub use indicator::{
    defined_sum, denominator_for_units, BatchOutcome, CoarseGrid, CoarsenOptions, FineCell, FineLattice,
    IndicatorBatch, IndicatorCatalog, IndicatorKind, IndicatorOutput, IndicatorQuery, IndicatorRecord,
    IndicatorRelation, IndicatorSource, IndicatorSpec, IndicatorTable, MaskPolicy, PopulationTable,
    RegionAssigner, WeightedCell, WeightedPopulation, RATE_INDICATORS,
};

#[doc(inline)]
pub use pipeline::{reduce_population, weight_indicators, PopulationStage};

#[doc(inline)]
pub use report::{BatchReport, ConservationCheck, SkipReason, Skipped};

#[doc(inline)]
pub use tile::{non_overlapping_tiles, AbortHandle, AggregatedRecord, ChunkRange, ReducedRaster, TileAggregator, TilingPlan};

#[doc(inline)]
pub use types::{GeoType, RegionId};
