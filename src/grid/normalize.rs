use tracing::info;

use crate::{error::GridError, grid::RasterGrid};

/// Floor a population-intensity grid into whole-person counts.
///
/// Missing cells (NaN, infinities, the grid's no-data sentinel) and negative
/// values become zero. Values are floored rather than rounded so totals are
/// never inflated.
pub fn floor_integer(grid: &RasterGrid<f64>) -> RasterGrid<i64> {
    let nodata = grid.nodata();
    grid.map(|&v| {
        if !v.is_finite() || Some(v) == nodata || v < 0.0 { 0 }
        else { v.floor() as i64 }
    })
}

/// Night, day, and averaged integer population on one shared lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationLayers {
    pub night: RasterGrid<i64>,
    pub day: RasterGrid<i64>,
    pub average: RasterGrid<i64>,
}

/// Normalize both population sources and combine them into a floored mean.
///
/// Both grids must carry the same coordinate reference and cell centres.
pub fn average_population(night: &RasterGrid<f64>, day: &RasterGrid<f64>) -> Result<PopulationLayers, GridError> {
    night.ensure_same_lattice(day)?;

    let night = floor_integer(night);
    let day = floor_integer(day);

    // Both counts are non-negative, so integer division is the floor of the mean.
    let average = night.with_values((night.values() + day.values()) / 2)?;

    info!(
        "averaged population over ({}, {}) grid: night={} day={} average={}",
        average.rows(), average.cols(), night.total(), day.total(), average.total()
    );

    Ok(PopulationLayers { night, day, average })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Crs;
    use ndarray::{array, Array2};

    fn grid(values: Array2<f64>, crs: Crs) -> RasterGrid<f64> {
        let (rows, cols) = values.dim();
        RasterGrid::new(
            values,
            (0..cols).map(|i| i as f64).collect(),
            (0..rows).map(|i| -(i as f64)).collect(),
            (1.0, -1.0),
            crs,
        ).unwrap()
    }

    #[test]
    fn floors_instead_of_rounding() {
        let g = grid(array![[0.2, 1.9], [2.5, 7.999]], Crs::epsg(4326));
        assert_eq!(floor_integer(&g).values(), &array![[0, 1], [2, 7]]);
    }

    #[test]
    fn missing_and_negative_become_zero() {
        let g = grid(array![[f64::NAN, -3.0], [-9999.0, 4.0]], Crs::epsg(4326))
            .with_nodata(Some(-9999.0));
        assert_eq!(floor_integer(&g).values(), &array![[0, 0], [0, 4]]);
    }

    #[test]
    fn idempotent_on_integer_grids() {
        let g = grid(array![[0.0, 3.0, 8.0], [1.0, 0.0, 12.0]], Crs::epsg(4326));
        let once = floor_integer(&g);
        let twice = floor_integer(&once.to_f64());
        assert_eq!(once, twice);
        assert_eq!(once.total(), 24);
    }

    #[test]
    fn average_is_floored_mean_of_floored_inputs() {
        let night = grid(array![[1.7, 4.0], [f64::NAN, 10.2]], Crs::epsg(4326));
        let day = grid(array![[2.2, 7.0], [3.0, 0.0]], Crs::epsg(4326));
        let layers = average_population(&night, &day).unwrap();

        assert_eq!(layers.night.values(), &array![[1, 4], [0, 10]]);
        assert_eq!(layers.day.values(), &array![[2, 7], [3, 0]]);
        assert_eq!(layers.average.values(), &array![[1, 5], [1, 5]]);
    }

    #[test]
    fn average_rejects_mismatched_reference() {
        let night = grid(array![[1.0]], Crs::epsg(4326));
        let day = grid(array![[1.0]], Crs::epsg(3857));
        let err = average_population(&night, &day).unwrap_err();
        assert!(matches!(err, GridError::ReferenceMismatch { .. }));
    }

    #[test]
    fn average_rejects_mismatched_shape() {
        let night = grid(array![[1.0, 2.0]], Crs::epsg(4326));
        let day = grid(array![[1.0]], Crs::epsg(4326));
        assert!(matches!(average_population(&night, &day), Err(GridError::GridMismatch(_))));
    }
}
