//! GeoJSON export of fishnet layers.

use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{Context, Result};
use geo::{coord, Polygon, Rect};
use serde_json::{json, Map, Value};

use crate::{geom::Fishnet, grid::CellValue};

impl<T: CellValue> Fishnet<T> {
    /// Export every cell as a GeoJSON FeatureCollection.
    pub fn to_geojson(&self) -> Value {
        self.to_geojson_with_bounds(None)
    }

    /// Export cells as a GeoJSON FeatureCollection, optionally only those
    /// intersecting `bounds = [min_x, min_y, max_x, max_y]`.
    ///
    /// The collection carries the layer's reference tag as a top-level `crs` member.
    pub fn to_geojson_with_bounds(&self, bounds: Option<[f64; 4]>) -> Value {
        let indices = match bounds {
            Some([min_x, min_y, max_x, max_y]) =>
                self.query(Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })),
            None => (0..self.len()).collect(),
        };

        let features = indices.into_iter()
            .map(|idx| {
                let cell = &self.cells()[idx];
                let mut properties = Map::new();
                properties.insert("x".to_string(), json!(cell.x));
                properties.insert("y".to_string(), json!(cell.y));
                properties.insert("value".to_string(), json!(cell.value));
                json!({
                    "type": "Feature",
                    "id": idx,
                    "geometry": polygon_to_geojson(&cell.polygon),
                    "properties": properties,
                })
            })
            .collect::<Vec<_>>();

        json!({
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": self.crs().as_str() } },
            "features": features,
        })
    }
}

fn polygon_to_geojson(polygon: &Polygon<f64>) -> Value {
    let ring = |ls: &geo::LineString<f64>| ls.coords().map(|c| vec![c.x, c.y]).collect::<Vec<_>>();
    let rings = std::iter::once(ring(polygon.exterior()))
        .chain(polygon.interiors().iter().map(ring))
        .collect::<Vec<_>>();
    json!({
        "type": "Polygon",
        "coordinates": rings,
    })
}

/// Write a JSON value to `path`.
pub fn write_json(value: &Value, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("[io::geojson] Failed to create file: {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), value)
        .with_context(|| format!("[io::geojson] Failed to write JSON to {:?}", path))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use crate::grid::{Crs, RasterGrid};

    use super::*;

    fn fishnet() -> Fishnet<i64> {
        let grid = RasterGrid::new(
            array![[7, 8], [9, 10]],
            vec![0.5, 1.5],
            vec![1.5, 0.5],
            (1.0, -1.0),
            Crs::epsg(3857),
        ).unwrap();
        Fishnet::from_grid(&grid)
    }

    #[test]
    fn feature_collection_has_closed_rings_and_crs() {
        let value = fishnet().to_geojson();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["crs"]["properties"]["name"], "EPSG:3857");

        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 4);
        let ring = features[0]["geometry"]["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        assert_eq!(features[0]["properties"]["value"], 7);
    }

    #[test]
    fn bounds_filter_features() {
        let value = fishnet().to_geojson_with_bounds(Some([1.1, 0.1, 1.9, 0.9]));
        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["value"], 10);
    }
}
