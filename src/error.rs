use std::fmt;

use thiserror::Error;

use crate::report::ConservationCheck;

/// A single violated tiling constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TilingViolation {
    NotSquare { rows: usize, cols: usize },
    ZeroWindow,
    ZeroChunk,
    ZeroMultiple,
    ChunkNotMultipleOfWindow { chunk: usize, window: usize },
    SideNotMultipleOfChunk { side: usize, chunk: usize },
    SideNotMultipleOfWindow { side: usize, window: usize },
}

impl fmt::Display for TilingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSquare { rows, cols } =>
                write!(f, "raster with dimensions ({rows}, {cols}) is not square"),
            Self::ZeroWindow => f.write_str("window size must be positive"),
            Self::ZeroChunk => f.write_str("chunk size must be positive"),
            Self::ZeroMultiple => f.write_str("alignment multiple must be positive"),
            Self::ChunkNotMultipleOfWindow { chunk, window } =>
                write!(f, "chunk size {chunk} is not a multiple of the window size {window}"),
            Self::SideNotMultipleOfChunk { side, chunk } =>
                write!(f, "grid side {side} is not a multiple of the chunk size {chunk}"),
            Self::SideNotMultipleOfWindow { side, window } =>
                write!(f, "grid side {side} is not a multiple of the window size {window}"),
        }
    }
}

/// Precondition failures of the grid stages.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("invalid tiling configuration: {}", join(.violations))]
    Configuration { violations: Vec<TilingViolation> },

    #[error("coordinate reference mismatch: {left} != {right}")]
    ReferenceMismatch { left: String, right: String },

    #[error("grids do not line up: {0}")]
    GridMismatch(String),

    #[error("invalid {axis} coordinates: {reason}")]
    InvalidCoordinates { axis: char, reason: String },

    #[error("{0}")]
    Conservation(ConservationCheck),

    #[error("tile aggregation aborted before all chunks completed")]
    Aborted,

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Per-indicator failures; a batch skips the indicator and continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IndicatorError {
    #[error("variable {indicator} not in data for year {year}")]
    MissingVariable { indicator: String, year: u16 },

    #[error("conflicting values for {indicator} in region {region}")]
    DuplicateValue { indicator: String, region: String },

    #[error("out of memory processing {indicator} (needed roughly {estimated_bytes} bytes)")]
    ResourceExhaustion { indicator: String, estimated_bytes: usize },
}

fn join(violations: &[TilingViolation]) -> String {
    violations.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
