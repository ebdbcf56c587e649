mod csv;
mod fallback;
mod fetch;
mod geojson;
mod gzip;
mod loader;

pub use fetch::{DiskFetcher, FetchError, Fetcher, MemFetcher, Payload};
#[cfg(feature = "download")]
pub use fetch::HttpFetcher;
pub use loader::{DataLoader, Origin, Tabular, VectorData};
pub(crate) use csv::read_from_csv_bytes;
pub(crate) use geojson::{features, point_coords, properties};
pub(crate) use fallback::{FALLBACK_POINTS, FALLBACK_START};
