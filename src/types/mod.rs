mod geo_type;
mod geo_id;

pub use geo_type::GeoType;
pub use geo_id::RegionId;
