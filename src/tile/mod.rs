mod plan;
mod reduce;

pub use plan::{non_overlapping_tiles, ChunkRange, TilingPlan};
pub use reduce::{AbortHandle, AggregatedRecord, ReducedRaster, TileAggregator};
