use ahash::AHashMap;
use tracing::info;

use crate::{
    indicator::PopulationTable,
    report::ConservationCheck,
    types::RegionId,
};

/// A fine cell with its share of its region's population.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedCell {
    pub x: f64,
    pub y: f64,
    pub population: i64,
    pub region: Option<RegionId>,
    /// `population / region total`; `None` without a region or when the region total is zero.
    pub weight: Option<f64>,
}

/// Fine cells weighted within their regions.
#[derive(Debug, Clone, Default)]
pub struct WeightedPopulation {
    cells: Vec<WeightedCell>,
    region_totals: AHashMap<RegionId, i64>,
}

impl WeightedPopulation {
    /// Group cells by region and weight each by its share of the region total.
    pub fn compute(table: &PopulationTable) -> Self {
        let mut region_totals: AHashMap<RegionId, i64> = AHashMap::new();
        for cell in table.cells() {
            if let Some(region) = &cell.region {
                *region_totals.entry(region.clone()).or_default() += cell.population;
            }
        }

        let cells = table.cells().iter()
            .map(|cell| WeightedCell {
                x: cell.x,
                y: cell.y,
                population: cell.population,
                region: cell.region.clone(),
                weight: cell.region.as_ref()
                    .and_then(|r| region_totals.get(r))
                    .filter(|&&total| total != 0)
                    .map(|&total| cell.population as f64 / total as f64),
            })
            .collect::<Vec<_>>();

        let zero_regions = region_totals.values().filter(|&&t| t == 0).count();
        info!(
            "weighted {} cells across {} regions ({} with zero population)",
            cells.len(), region_totals.len(), zero_regions
        );

        Self { cells, region_totals }
    }

    #[inline] pub fn cells(&self) -> &[WeightedCell] { &self.cells }

    #[inline] pub fn len(&self) -> usize { self.cells.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.cells.is_empty() }

    #[inline] pub fn region_total(&self, region: &RegionId) -> Option<i64> { self.region_totals.get(region).copied() }

    #[inline] pub fn region_count(&self) -> usize { self.region_totals.len() }

    /// Sum of weights per region.
    pub fn weight_sums(&self) -> AHashMap<RegionId, f64> {
        let mut sums: AHashMap<RegionId, f64> = AHashMap::new();
        for cell in &self.cells {
            if let (Some(region), Some(weight)) = (&cell.region, cell.weight) {
                *sums.entry(region.clone()).or_default() += weight;
            }
        }
        sums
    }

    /// Weights of every populated region must sum to one. Returns the failing regions' checks.
    pub fn partition_of_unity(&self, tolerance: f64) -> Vec<ConservationCheck> {
        let mut failures = self.weight_sums().into_iter()
            .map(|(region, sum)| ConservationCheck::approx(format!("weights/{region}"), 1.0, sum, tolerance))
            .filter(|check| !check.passed())
            .map(ConservationCheck::logged)
            .collect::<Vec<_>>();
        failures.sort_by(|a, b| a.stage.cmp(&b.stage));
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::FineCell;

    fn cell(x: f64, population: i64, region: Option<&str>) -> FineCell {
        FineCell { x, y: 0.0, population, region: region.map(RegionId::new) }
    }

    #[test]
    fn weights_are_population_shares() {
        let table = PopulationTable::new(vec![cell(0.0, 10, Some("A")), cell(1.0, 30, Some("A"))]);
        let weighted = WeightedPopulation::compute(&table);

        let weights = weighted.cells().iter().map(|c| c.weight.unwrap()).collect::<Vec<_>>();
        assert_eq!(weights, vec![0.25, 0.75]);
        assert_eq!(weighted.region_total(&RegionId::new("A")), Some(40));
    }

    #[test]
    fn weights_partition_unity_per_region() {
        let table = PopulationTable::new(
            (0..30).map(|i| cell(i as f64, (i * 7 % 11) as i64 + 1, Some(["A", "B", "C"][i % 3]))).collect()
        );
        let weighted = WeightedPopulation::compute(&table);
        for sum in weighted.weight_sums().values() {
            assert!((sum - 1.0).abs() < 1e-6);
        }
        assert!(weighted.partition_of_unity(1e-6).is_empty());
    }

    #[test]
    fn zero_population_region_has_no_weights() {
        let table = PopulationTable::new(vec![
            cell(0.0, 0, Some("EMPTY")),
            cell(1.0, 0, Some("EMPTY")),
            cell(2.0, 5, None),
        ]);
        let weighted = WeightedPopulation::compute(&table);
        assert!(weighted.cells().iter().all(|c| c.weight.is_none()));
        assert_eq!(weighted.region_total(&RegionId::new("EMPTY")), Some(0));
        assert_eq!(weighted.region_count(), 1);
        assert!(weighted.partition_of_unity(1e-6).is_empty());
    }
}
