mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};
use commands::{fishnet, reduce, weight};

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    match &cli.command {
        Commands::Reduce(args) => reduce::run(&cli, args),
        Commands::Fishnet(args) => fishnet::run(&cli, args),
        Commands::Weight(args) => weight::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }
