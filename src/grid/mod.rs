mod align;
mod normalize;
mod raster;
mod source;

pub use align::{make_divisible_square_extent, square_side, AlignedGrid};
pub use normalize::{average_population, floor_integer, PopulationLayers};
pub use raster::{CellValue, Crs, RasterGrid};
pub use source::{GridSource, TableGrid};
