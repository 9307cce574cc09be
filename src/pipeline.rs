use anyhow::{Context, Result};
use tracing::info;

use crate::{
    config::PipelineConfig,
    grid::{average_population, make_divisible_square_extent, AlignedGrid, GridSource, PopulationLayers},
    indicator::{CoarseGrid, IndicatorBatch, IndicatorCatalog, IndicatorRelation, IndicatorSpec, PopulationTable, WeightedPopulation},
    report::{BatchReport, ConservationCheck},
    tile::{AbortHandle, ReducedRaster, TileAggregator},
};

/// Everything the population stages produce, kept for inspection and persistence.
#[derive(Debug, Clone)]
pub struct PopulationStage {
    pub layers: PopulationLayers,
    pub aligned: AlignedGrid,
    pub reduced: ReducedRaster,
}

impl PopulationStage {
    /// Padding and tiling checks, in pipeline order.
    pub fn checks(&self) -> Vec<ConservationCheck> {
        vec![self.aligned.check.clone(), self.reduced.check.clone()]
    }
}

/// Read both population sources, average them, pad to a tileable square and
/// reduce to window records.
pub fn reduce_population(
    night: &dyn GridSource,
    day: &dyn GridSource,
    config: &PipelineConfig,
    abort: &AbortHandle,
) -> Result<PopulationStage> {
    let night = night.read().context("[pipeline] failed to read night population")?;
    let day = day.read().context("[pipeline] failed to read day population")?;

    let layers = average_population(&night, &day)?;
    let aligned = make_divisible_square_extent(&layers.average, Some(config.alignment_multiple()))?;

    let tiling = &config.tiling;
    let reduced = TileAggregator::new(tiling.window_size, tiling.chunk_size, tiling.workers)
        .reduce_with_abort(&aligned.grid, abort)?;

    info!(
        "population reduced from ({}, {}) to {} records, total {}",
        layers.average.rows(), layers.average.cols(), reduced.records.len(), reduced.total()
    );
    Ok(PopulationStage { layers, aligned, reduced })
}

/// Weight the joined population table and coarsen every catalog indicator.
///
/// Regions whose weights do not sum to one are added to the report's
/// conservation checks ahead of the per-indicator checks.
pub fn weight_indicators(
    table: &PopulationTable,
    relation: &IndicatorRelation,
    catalog: &IndicatorCatalog,
    config: &PipelineConfig,
    skip: impl FnMut(&IndicatorSpec) -> bool,
    emit: impl FnMut(CoarseGrid) -> Result<()>,
) -> Result<BatchReport> {
    let weighted = WeightedPopulation::compute(table);
    let mut report = BatchReport {
        conservation: weighted.partition_of_unity(config.weights.tolerance),
        ..Default::default()
    };

    let batch = IndicatorBatch::new(&weighted, relation, config.coarsen)?;
    report.merge(batch.run_with(catalog, skip, emit)?);
    Ok(report)
}
