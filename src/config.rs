use std::{fs, path::Path, thread};

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{indicator::CoarsenOptions, types::GeoType};

/// Window, chunk and worker pool sizes of the tiled reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    pub window_size: usize,
    pub chunk_size: usize,
    pub workers: usize,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            chunk_size: 1000,
            workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Padded side is rounded up to this multiple; defaults to the chunk size.
    pub multiple: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    /// Allowed deviation of a region's weight sum from one.
    pub tolerance: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self { Self { tolerance: 1e-6 } }
}

/// Settings for a full pipeline run, usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tiling: TilingConfig,
    pub alignment: AlignmentConfig,
    pub coarsen: CoarsenOptions,
    pub weights: WeightsConfig,
    pub region_type: GeoType,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tiling: TilingConfig::default(),
            alignment: AlignmentConfig::default(),
            coarsen: CoarsenOptions::default(),
            weights: WeightsConfig::default(),
            region_type: GeoType::Tract,
        }
    }
}

impl PipelineConfig {
    /// Read a config from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("[config] failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("[config] failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Alignment multiple, falling back to the chunk size.
    #[inline]
    pub fn alignment_multiple(&self) -> usize {
        self.alignment.multiple.unwrap_or(self.tiling.chunk_size)
    }

    /// Reject sizes and tolerances no stage can work with.
    ///
    /// Divisibility between the sizes is left to the tiling plan, which sees the grid.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.tiling.window_size == 0 { problems.push("tiling.window_size must be positive") }
        if self.tiling.chunk_size == 0 { problems.push("tiling.chunk_size must be positive") }
        if self.tiling.workers == 0 { problems.push("tiling.workers must be positive") }
        if self.alignment.multiple == Some(0) { problems.push("alignment.multiple must be positive") }
        if self.coarsen.factor == 0 { problems.push("coarsen.factor must be positive") }
        if !(self.coarsen.tolerance.is_finite() && self.coarsen.tolerance > 0.0) {
            problems.push("coarsen.tolerance must be a positive number")
        }
        if !(self.weights.tolerance.is_finite() && self.weights.tolerance > 0.0) {
            problems.push("weights.tolerance must be a positive number")
        }
        if !problems.is_empty() {
            bail!("[config] invalid pipeline config: {}", problems.join("; "));
        }
        ensure!(
            self.tiling.chunk_size % self.tiling.window_size == 0,
            "[config] tiling.chunk_size {} is not a multiple of tiling.window_size {}",
            self.tiling.chunk_size, self.tiling.window_size
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::MaskPolicy;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tiling.window_size, 10);
        assert_eq!(config.alignment_multiple(), 1000);
        assert_eq!(config.coarsen.factor, 10);
        assert_eq!(config.region_type, GeoType::Tract);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{
            "tiling": { "window_size": 2, "chunk_size": 4, "workers": 3 },
            "coarsen": { "mask": "zero_is_missing" },
            "region_type": "county"
        }"#).unwrap();
        config.validate().unwrap();
        assert_eq!(config.tiling.workers, 3);
        assert_eq!(config.alignment_multiple(), 4);
        assert_eq!(config.coarsen.mask, MaskPolicy::ZeroIsMissing);
        assert_eq!(config.coarsen.factor, 10);
        assert_eq!(config.weights.tolerance, 1e-6);
        assert_eq!(config.region_type, GeoType::County);
    }

    #[test]
    fn every_problem_is_reported() {
        let mut config = PipelineConfig::default();
        config.tiling.window_size = 0;
        config.coarsen.factor = 0;
        config.weights.tolerance = -1.0;
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("window_size"));
        assert!(msg.contains("coarsen.factor"));
        assert!(msg.contains("weights.tolerance"));
    }

    #[test]
    fn chunk_must_divide_by_window() {
        let mut config = PipelineConfig::default();
        config.tiling.window_size = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "alignment": { "multiple": 20 } }"#).unwrap();
        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.alignment_multiple(), 20);

        fs::write(&path, r#"{ "tiling": { "chunk_size": 0 } }"#).unwrap();
        assert!(PipelineConfig::from_json_file(&path).is_err());
    }
}
