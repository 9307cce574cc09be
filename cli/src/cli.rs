use std::path::PathBuf;

/// Population grid reduction and indicator disaggregation
#[derive(clap::Parser, Debug)]
#[command(name = "popgrid", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Pipeline config (JSON); flags below override it
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Average night and day population grids, pad and reduce them to window records
    Reduce(ReduceArgs),

    /// Convert a grid table into a GeoJSON fishnet for spatial joins
    Fishnet(FishnetArgs),

    /// Weight indicators onto the joined population table and coarsen them
    Weight(WeightArgs),
}

/// A grid given as a long `(x, y, value)` table.
#[derive(clap::Args, Debug)]
pub struct GridArgs {
    /// Signed cell size along x and y, e.g. `--resolution 0.0083 -0.0083`
    #[arg(long, num_args = 2, value_names = ["RX", "RY"], allow_negative_numbers = true, required = true)]
    pub resolution: Vec<f64>,

    /// Coordinate reference tag of the grids
    #[arg(long, default_value = "EPSG:4326")]
    pub crs: String,

    /// Value column of the grid tables
    #[arg(long, default_value = "value")]
    pub value_column: String,

    /// Cell value meaning "no data"
    #[arg(long, allow_negative_numbers = true)]
    pub nodata: Option<f64>,
}

#[derive(clap::Args, Debug)]
pub struct ReduceArgs {
    /// Night-time population grid table (CSV or Parquet)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub night: PathBuf,

    /// Day-time population grid table (CSV or Parquet)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub day: PathBuf,

    #[command(flatten)]
    pub grid: GridArgs,

    /// Output record table, defaults to "./population.csv"
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Window size in cells
    #[arg(long)]
    pub window: Option<usize>,

    /// Chunk size in cells
    #[arg(long)]
    pub chunk: Option<usize>,

    /// Number of worker threads
    #[arg(long)]
    pub workers: Option<usize>,

    /// Pad the grid side to a multiple of this
    #[arg(long)]
    pub multiple: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct FishnetArgs {
    /// Grid table (CSV or Parquet)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub input: PathBuf,

    #[command(flatten)]
    pub grid: GridArgs,

    /// Output GeoJSON file, defaults to "./fishnet.geojson"
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Also write cell centres and values as an `(x, y, value)` table (CSV or Parquet)
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub table: Option<PathBuf>,

    /// Only export cells intersecting MIN_X MIN_Y MAX_X MAX_Y
    #[arg(long, num_args = 4, value_names = ["MIN_X", "MIN_Y", "MAX_X", "MAX_Y"], allow_negative_numbers = true)]
    pub bounds: Option<Vec<f64>>,
}

#[derive(clap::Args, Debug)]
pub struct WeightArgs {
    /// Long indicator table: GEOID, DEMOGRAPHICS_NAME, YEAR, GEOTYPE, VALUE[, UNITS]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub indicators: PathBuf,

    /// Indicator units table: NAME, UNITS
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub units: PathBuf,

    /// Population table joined to regions: x, y, population column, region column
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub population: PathBuf,

    /// Reporting year
    #[arg(short, long)]
    pub year: u16,

    /// Output path template; `{}` placeholders take the indicator name, then the year
    #[arg(short, long)]
    pub save: String,

    /// Population column of the population table
    #[arg(long, default_value = "average_population")]
    pub population_column: String,

    /// Region id column of the population table
    #[arg(long, default_value = "GEOID")]
    pub region_column: String,

    /// Only load count indicators whose UNITS column equals this
    #[arg(long, default_value = "count")]
    pub count_measure: String,

    /// Restrict the batch to these indicators
    #[arg(long, num_args = 1..)]
    pub only: Option<Vec<String>>,

    /// Coarsening factor (fine cells per coarse cell along each axis)
    #[arg(long)]
    pub factor: Option<usize>,
}
