use anyhow::Result;
use popgrid::{io::{records_to_frame, write_table}, reduce_population, AbortHandle};
use tracing::info;

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::ReduceArgs) -> Result<()> {
    let mut config = super::load_config(cli)?;
    if let Some(window) = args.window { config.tiling.window_size = window }
    if let Some(chunk) = args.chunk { config.tiling.chunk_size = chunk }
    if let Some(workers) = args.workers { config.tiling.workers = workers }
    if args.multiple.is_some() { config.alignment.multiple = args.multiple }
    config.validate()?;

    let out_path = &args.output.clone().unwrap_or("./population.csv".into());

    info!("[reduce] reading grids {} and {}", args.night.display(), args.day.display());
    let night = super::read_grid(&args.night, &args.grid)?;
    let day = super::read_grid(&args.day, &args.grid)?;

    let stage = reduce_population(&night, &day, &config, &AbortHandle::new())?;

    info!("[reduce] writing {} records to {}", stage.reduced.records.len(), out_path.display());
    write_table(&mut records_to_frame(&stage.reduced.records)?, out_path)?;

    println!("{}", serde_json::to_string_pretty(&stage.checks())?);
    Ok(())
}
