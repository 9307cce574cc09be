use ahash::AHashMap;
use anyhow::{bail, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::IndicatorError,
    indicator::{
        coarsen::{ratio, try_buffer, BlockAccumulator},
        defined_sum, FineLattice, IndicatorCatalog, IndicatorKind, IndicatorRelation, IndicatorSpec,
        MaskPolicy, WeightedPopulation,
    },
    report::{BatchReport, ConservationCheck},
    types::RegionId,
};

/// How fine cells are grouped into coarse cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarsenOptions {
    /// Fine cells per coarse cell along each axis.
    pub factor: usize,
    /// Absolute tolerance of the fine vs. coarse conservation checks.
    pub tolerance: f64,
    pub mask: MaskPolicy,
}

impl Default for CoarsenOptions {
    fn default() -> Self {
        Self { factor: 10, tolerance: 1e-3, mask: MaskPolicy::default() }
    }
}

/// Named coarse layers of one indicator for one period, on a shared coarse lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseGrid {
    name: String,
    year: u16,
    x: Vec<f64>,
    y: Vec<f64>,
    layers: Vec<(String, Array2<Option<f64>>)>,
}

impl CoarseGrid {
    #[inline] pub fn name(&self) -> &str { &self.name }

    #[inline] pub fn year(&self) -> u16 { self.year }

    #[inline] pub fn x(&self) -> &[f64] { &self.x }

    #[inline] pub fn y(&self) -> &[f64] { &self.y }

    /// `(rows, cols)` of every layer.
    #[inline] pub fn dims(&self) -> (usize, usize) { (self.y.len(), self.x.len()) }

    #[inline] pub fn layers(&self) -> &[(String, Array2<Option<f64>>)] { &self.layers }

    pub fn layer(&self, name: &str) -> Option<&Array2<Option<f64>>> {
        self.layers.iter().find(|(n, _)| n == name).map(|(_, values)| values)
    }
}

/// Coarse result of one indicator plus the conservation checks it ran.
#[derive(Debug, Clone)]
pub struct IndicatorOutput {
    pub grid: CoarseGrid,
    pub checks: Vec<ConservationCheck>,
}

/// Collected outputs of an in-memory batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub outputs: Vec<CoarseGrid>,
    pub report: BatchReport,
}

/// Disaggregates region-level indicators onto weighted fine cells and coarsens them.
///
/// Count indicators are weighted, summed per block, then divided by their
/// similarly coarsened denominator. Rate indicators skip the weighting and are
/// averaged per block; the weights are still computed upstream but never used.
pub struct IndicatorBatch<'a> {
    population: &'a WeightedPopulation,
    relation: &'a IndicatorRelation,
    lattice: FineLattice,
    options: CoarsenOptions,
}

impl<'a> IndicatorBatch<'a> {
    pub fn new(population: &'a WeightedPopulation, relation: &'a IndicatorRelation, options: CoarsenOptions)
        -> Result<Self>
    {
        if options.factor == 0 { bail!("[indicator::batch] coarsening factor must be positive") }
        let lattice = FineLattice::new(population.cells());
        let (rows, cols) = lattice.dims();
        let (coarse_rows, coarse_cols) = lattice.coarse_dims(options.factor);
        info!(
            "coarsening {rows}x{cols} fine lattice to {coarse_rows}x{coarse_cols} (factor {}) for {}",
            options.factor, relation.year()
        );
        Ok(Self { population, relation, lattice, options })
    }

    #[inline] pub fn lattice(&self) -> &FineLattice { &self.lattice }

    #[inline] pub fn options(&self) -> &CoarsenOptions { &self.options }

    /// Region values of `variable`, needed to process `indicator`.
    fn region_values(&self, indicator: &str, variable: &str)
        -> Result<&'a AHashMap<RegionId, f64>, IndicatorError>
    {
        if let Some(region) = self.relation.conflict(variable) {
            return Err(IndicatorError::DuplicateValue { indicator: indicator.to_string(), region: region.to_string() });
        }
        self.relation.get(variable).ok_or_else(|| {
            if variable != indicator { debug!("{indicator} needs missing variable {variable}") }
            IndicatorError::MissingVariable { indicator: indicator.to_string(), year: self.relation.year() }
        })
    }

    /// Broadcast region values onto fine cells, scaled by each cell's weight when `weighted`.
    fn broadcast(&self, indicator: &str, values: &AHashMap<RegionId, f64>, weighted: bool)
        -> Result<Vec<Option<f64>>, IndicatorError>
    {
        let cells = self.population.cells();
        let mut out = try_buffer(cells.len(), None, indicator)?;
        for (slot, cell) in out.iter_mut().zip(cells) {
            let value = cell.region.as_ref().and_then(|r| values.get(r)).copied();
            *slot = if weighted { value.zip(cell.weight).map(|(v, w)| v * w) } else { value };
        }
        Ok(out)
    }

    fn coarse_grid(&self, name: &str, layers: Vec<(String, Array2<Option<f64>>)>) -> CoarseGrid {
        let (x, y) = self.lattice.coarse_coords(self.options.factor);
        CoarseGrid { name: name.to_string(), year: self.relation.year(), x, y, layers }
    }

    /// Weighted sum-then-ratio coarsening of a count indicator and its denominator.
    pub fn count_indicator(&self, name: &str, total: &str) -> Result<IndicatorOutput, IndicatorError> {
        let values = self.region_values(name, name)?;
        let totals = self.region_values(name, total)?;
        let factor = self.options.factor;

        let contribution = self.broadcast(name, values, true)?;
        let total_contribution = self.broadcast(name, totals, true)?;

        let count = BlockAccumulator::accumulate(&self.lattice, factor, &contribution, name)?.sum();
        let corrected = BlockAccumulator::accumulate(&self.lattice, factor, &total_contribution, name)?.sum();
        let percent = ratio(&count, &corrected);

        let fine_sum = |values: &[Option<f64>]| values.iter().flatten().sum::<f64>();
        let checks = vec![
            ConservationCheck::approx(
                format!("{name}/count"), fine_sum(&contribution), defined_sum(&count), self.options.tolerance,
            ).logged(),
            ConservationCheck::approx(
                format!("{name}/total"), fine_sum(&total_contribution), defined_sum(&corrected), self.options.tolerance,
            ).logged(),
        ];

        let mask = self.options.mask;
        let layers = vec![
            (format!("{name}_LANDSCAN_COUNT"), count.mapv(|v| mask.apply(v))),
            (format!("{total}_corrected"), corrected.mapv(|v| mask.apply(v))),
            (format!("{name}_LANDSCAN_PERCENT"), percent.mapv(|v| mask.apply(v))),
        ];
        Ok(IndicatorOutput { grid: self.coarse_grid(name, layers), checks })
    }

    /// Block mean of a broadcast rate indicator. Never zero-masked.
    pub fn rate_indicator(&self, name: &str) -> Result<IndicatorOutput, IndicatorError> {
        let values = self.region_values(name, name)?;
        let broadcast = self.broadcast(name, values, false)?;
        let mean = BlockAccumulator::accumulate(&self.lattice, self.options.factor, &broadcast, name)?.mean();
        Ok(IndicatorOutput {
            grid: self.coarse_grid(name, vec![(name.to_string(), mean)]),
            checks: Vec::new(),
        })
    }

    pub fn process(&self, spec: &IndicatorSpec) -> Result<IndicatorOutput, IndicatorError> {
        match &spec.kind {
            IndicatorKind::Count { total } => self.count_indicator(&spec.name, total),
            IndicatorKind::Rate => self.rate_indicator(&spec.name),
        }
    }

    /// Process every indicator in the catalog not excluded by `skip`, handing each
    /// result to `emit`. Per-indicator failures become skip entries; only `emit`
    /// errors stop the run.
    pub fn run_with(
        &self,
        catalog: &IndicatorCatalog,
        mut skip: impl FnMut(&IndicatorSpec) -> bool,
        mut emit: impl FnMut(CoarseGrid) -> Result<()>,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for spec in catalog.iter() {
            if skip(spec) {
                debug!("{} already processed for {}, skipping", spec.name, self.relation.year());
                continue;
            }
            match self.process(spec) {
                Ok(output) => {
                    info!("processed {} for {}", spec.name, self.relation.year());
                    report.conservation.extend(output.checks);
                    emit(output.grid)?;
                    report.succeeded.push(spec.name.clone());
                }
                Err(error) => report.skip(error),
            }
        }

        info!(
            "batch finished: {} succeeded, {} skipped, {} failed conservation checks",
            report.succeeded.len(), report.skipped.len(), report.failed_checks().count()
        );
        Ok(report)
    }

    /// Process the whole catalog, keeping every output in memory.
    pub fn run(&self, catalog: &IndicatorCatalog) -> Result<BatchOutcome> {
        let mut outputs = Vec::new();
        let report = self.run_with(catalog, |_| false, |grid| {
            outputs.push(grid);
            Ok(())
        })?;
        Ok(BatchOutcome { outputs, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        indicator::{FineCell, IndicatorRecord, PopulationTable},
        report::SkipReason,
    };

    fn population(cells: &[(f64, f64, i64, Option<&str>)]) -> WeightedPopulation {
        WeightedPopulation::compute(&PopulationTable::new(
            cells.iter()
                .map(|&(x, y, population, region)| FineCell { x, y, population, region: region.map(RegionId::new) })
                .collect()
        ))
    }

    fn relation(values: &[(&str, &str, f64)]) -> IndicatorRelation {
        IndicatorRelation::from_records(2018, values.iter().map(|&(indicator, region, value)| IndicatorRecord {
            region_id: RegionId::new(region),
            indicator: indicator.into(),
            year: 2018,
            value,
        })).unwrap()
    }

    fn options(factor: usize, mask: MaskPolicy) -> CoarsenOptions {
        CoarsenOptions { factor, tolerance: 1e-3, mask }
    }

    #[test]
    fn contributions_follow_population_weights() {
        let weighted = population(&[(0.0, 0.0, 10, Some("A")), (1.0, 0.0, 30, Some("A"))]);
        let relation = relation(&[("E_POV", "A", 100.0), ("TOTPOP", "A", 400.0)]);
        let batch = IndicatorBatch::new(&weighted, &relation, options(2, MaskPolicy::NoData)).unwrap();

        let contributions = batch.broadcast("E_POV", relation.get("E_POV").unwrap(), true).unwrap();
        assert_eq!(contributions, vec![Some(25.0), Some(75.0)]);

        let output = batch.count_indicator("E_POV", "TOTPOP").unwrap();
        let grid = &output.grid;
        assert_eq!(grid.dims(), (1, 1));
        assert_eq!(grid.layer("E_POV_LANDSCAN_COUNT").unwrap()[[0, 0]], Some(100.0));
        assert_eq!(grid.layer("TOTPOP_corrected").unwrap()[[0, 0]], Some(400.0));
        assert_eq!(grid.layer("E_POV_LANDSCAN_PERCENT").unwrap()[[0, 0]], Some(0.25));
        assert!(output.checks.iter().all(ConservationCheck::passed));
    }

    #[test]
    fn coarse_counts_conserve_fine_contributions() {
        let cells = (0..5)
            .flat_map(|r| (0..5).map(move |c| (c as f64, r as f64, (r * 5 + c) as i64 % 7, Some(["A", "B"][(c / 3) as usize]))))
            .collect::<Vec<_>>();
        let weighted = population(&cells);
        let relation = relation(&[("E_POV", "A", 120.0), ("E_POV", "B", 33.0), ("HH", "A", 50.0), ("HH", "B", 21.0)]);
        let batch = IndicatorBatch::new(&weighted, &relation, options(2, MaskPolicy::NoData)).unwrap();

        let output = batch.count_indicator("E_POV", "HH").unwrap();
        assert_eq!(output.grid.dims(), (3, 3));
        assert_eq!(output.checks.len(), 2);
        assert!(output.checks.iter().all(ConservationCheck::passed));
        let count = output.grid.layer("E_POV_LANDSCAN_COUNT").unwrap();
        assert!((defined_sum(count) - 153.0).abs() < 1e-3);
    }

    #[test]
    fn zero_masking_is_opt_in() {
        // Block 0 is populated with a zero indicator value, block 1 has no region.
        let cells = [(0.0, 0.0, 5, Some("A")), (1.0, 0.0, 5, None)];
        let weighted = population(&cells);
        let relation = relation(&[("E_POV", "A", 0.0), ("TOTPOP", "A", 10.0)]);

        let batch = IndicatorBatch::new(&weighted, &relation, options(1, MaskPolicy::NoData)).unwrap();
        let grid = batch.count_indicator("E_POV", "TOTPOP").unwrap().grid;
        let count = grid.layer("E_POV_LANDSCAN_COUNT").unwrap();
        assert_eq!(count.iter().copied().collect::<Vec<_>>(), vec![Some(0.0), None]);

        let batch = IndicatorBatch::new(&weighted, &relation, options(1, MaskPolicy::ZeroIsMissing)).unwrap();
        let grid = batch.count_indicator("E_POV", "TOTPOP").unwrap().grid;
        let count = grid.layer("E_POV_LANDSCAN_COUNT").unwrap();
        assert_eq!(count.iter().copied().collect::<Vec<_>>(), vec![None, None]);
    }

    #[test]
    fn rates_are_averaged_without_weights() {
        let weighted = population(&[(0.0, 0.0, 1, Some("A")), (1.0, 0.0, 99, Some("B")), (2.0, 0.0, 0, Some("C"))]);
        let relation = relation(&[("PCI", "A", 100.0), ("PCI", "B", 200.0), ("PCI", "C", 0.0)]);
        let batch = IndicatorBatch::new(&weighted, &relation, options(2, MaskPolicy::ZeroIsMissing)).unwrap();

        let output = batch.rate_indicator("PCI").unwrap();
        let layer = output.grid.layer("PCI").unwrap();
        assert_eq!(layer.iter().copied().collect::<Vec<_>>(), vec![Some(150.0), Some(0.0)]);
        assert!(output.checks.is_empty());
    }

    #[test]
    fn missing_variables_are_skipped() {
        let weighted = population(&[(0.0, 0.0, 10, Some("A"))]);
        let relation = relation(&[("E_POV", "A", 5.0), ("TOTPOP", "A", 10.0), ("E_NOHSDP", "A", 2.0)]);
        let catalog = IndicatorCatalog::new(vec![
            IndicatorSpec::count("E_POV", "TOTPOP"),
            IndicatorSpec::count("E_UNEMP", "TOTPOP"),
            IndicatorSpec::count("E_NOHSDP", "E_AGE25"),
            IndicatorSpec::rate("PCI"),
        ]);

        let outcome = IndicatorBatch::new(&weighted, &relation, CoarsenOptions::default()).unwrap().run(&catalog).unwrap();
        assert_eq!(outcome.report.succeeded, vec!["E_POV"]);
        assert_eq!(outcome.outputs.len(), 1);
        let skipped = outcome.report.skipped.iter().map(|s| s.indicator.as_str()).collect::<Vec<_>>();
        assert_eq!(skipped, vec!["E_UNEMP", "E_NOHSDP", "PCI"]);
        assert!(outcome.report.skipped.iter().all(|s| s.reason == SkipReason::MissingVariable));
    }

    #[test]
    fn conflicting_values_skip_only_their_indicator() {
        let weighted = population(&[(0.0, 0.0, 10, Some("A"))]);
        let relation = relation(&[("E_POV", "A", 5.0), ("E_POV", "A", 12.5), ("E_UNEMP", "A", 1.0), ("TOTPOP", "A", 10.0)]);
        let catalog = IndicatorCatalog::new(vec![
            IndicatorSpec::count("E_POV", "TOTPOP"),
            IndicatorSpec::count("E_UNEMP", "TOTPOP"),
        ]);

        let outcome = IndicatorBatch::new(&weighted, &relation, CoarsenOptions::default()).unwrap().run(&catalog).unwrap();
        assert_eq!(outcome.report.succeeded, vec!["E_UNEMP"]);
        assert_eq!(outcome.report.skipped.len(), 1);
        assert_eq!(outcome.report.skipped[0].indicator, "E_POV");
        assert_eq!(outcome.report.skipped[0].reason, SkipReason::DuplicateValue { region: "A".into() });
    }

    #[test]
    fn run_with_honours_skip_and_emit() {
        let weighted = population(&[(0.0, 0.0, 10, Some("A"))]);
        let relation = relation(&[("E_POV", "A", 5.0), ("TOTPOP", "A", 10.0), ("PCI", "A", 30000.0)]);
        let catalog = IndicatorCatalog::new(vec![IndicatorSpec::rate("PCI"), IndicatorSpec::count("E_POV", "TOTPOP")]);
        let batch = IndicatorBatch::new(&weighted, &relation, CoarsenOptions::default()).unwrap();

        let mut emitted = Vec::new();
        let report = batch.run_with(&catalog, |spec| spec.name == "PCI", |grid| {
            emitted.push(grid.name().to_string());
            Ok(())
        }).unwrap();
        assert_eq!(emitted, vec!["E_POV"]);
        assert!(report.is_clean());

        let err = batch.run_with(&catalog, |_| false, |_| Err(anyhow::anyhow!("disk full")));
        assert!(err.is_err());
    }
}
