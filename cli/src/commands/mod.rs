pub mod fishnet;
pub mod reduce;
pub mod weight;

use std::path::Path;

use anyhow::{Context, Result};
use popgrid::{io::read_table, Crs, PipelineConfig, TableGrid};

use crate::cli::{Cli, GridArgs};

/// Config from `--config`, or the defaults.
pub(crate) fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path),
        None => Ok(PipelineConfig::default()),
    }
}

/// Index a grid table onto its lattice.
pub(crate) fn read_grid(path: &Path, args: &GridArgs) -> Result<TableGrid> {
    let df = read_table(path)?;
    TableGrid::from_dataframe(
        &df, "x", "y", &args.value_column,
        (args.resolution[0], args.resolution[1]),
        Crs::new(&args.crs),
        args.nodata,
    ).with_context(|| format!("failed to index grid table {}", path.display()))
}
