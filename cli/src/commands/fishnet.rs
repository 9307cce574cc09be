use anyhow::{Context, Result};
use popgrid::{
    floor_integer,
    io::{fishnet_to_frame, write_json, write_table},
    Fishnet, GridSource,
};
use tracing::info;

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::FishnetArgs) -> Result<()> {
    let out_path = &args.output.clone().unwrap_or("./fishnet.geojson".into());

    let grid = super::read_grid(&args.input, &args.grid)?.read()?;
    let fishnet = Fishnet::from_grid(&floor_integer(&grid));

    let bounds = args.bounds.as_deref()
        .map(|b| <[f64; 4]>::try_from(b).context("bounds take four values"))
        .transpose()?;

    if let Some(table_path) = &args.table {
        info!("[fishnet] writing cell table to {}", table_path.display());
        write_table(&mut fishnet_to_frame(&fishnet)?, table_path)?;
    }

    info!("[fishnet] writing {} cells to {}", fishnet.len(), out_path.display());
    write_json(&fishnet.to_geojson_with_bounds(bounds), out_path)
}
