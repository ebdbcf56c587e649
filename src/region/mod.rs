mod config;
mod region;

pub use config::{AppConfig, RegionTable, Settings};
pub use region::{
    DataSources, GridModel, LatLon, MunicipalityModel, ObservationSource, Region, RegionCategory,
    VectorTileSource, expand_pattern,
};
pub(crate) use region::join_url;
