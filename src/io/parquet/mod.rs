//! Parquet format reading and writing operations.
//!
//! This module is only available when the `parquet` feature is enabled.

mod read;
mod write;

pub use read::*;
pub use write::*;
