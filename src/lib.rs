#![doc = "vectorisk public API"]
mod common;
mod dashboard;
mod loader;
mod observation;
mod overlay;
mod raster;
mod region;
mod series;

#[doc(inline)]
pub use common::{ColorScale, DateRange, DateSelector, Rgb, Spectral, parse_date, parse_loose_date};

#[doc(inline)]
pub use region::{
    AppConfig, DataSources, GridModel, LatLon, MunicipalityModel, ObservationSource, Region,
    RegionCategory, RegionTable, Settings, VectorTileSource, expand_pattern,
};

#[doc(inline)]
pub use loader::{
    DataLoader, DiskFetcher, FetchError, Fetcher, MemFetcher, Origin, Payload, Tabular, VectorData,
};

#[cfg(feature = "download")]
#[doc(inline)]
pub use loader::HttpFetcher;

#[doc(inline)]
pub use series::{Axis, ChartData, Dataset, TimeSeries, TimeSeriesPoint};

#[doc(inline)]
pub use raster::{RasterDecoder, RasterGrid, TiffDecoder, Validity, average};

#[doc(inline)]
pub use observation::{
    ALL_CATEGORIES, ObservationPoint, category_aliases, filter_by_category, filter_observations,
};

#[doc(inline)]
pub use overlay::{
    BackendKind, Capabilities, ColorRule, HeadlessRenderers, LayerHandle, LiveLayer, MapBackend,
    MapSnapshot, MapView, Marker, OverlayManager, OverlayName, OverlaySpec, PaintKind, PaintLayer,
    PathStyle, PixelColorFn, RendererFactory, SceneSnapshot, SourceSpec, StyleFn, TileLayer,
    TileRenderer, VectorTileRenderer,
};

#[doc(inline)]
pub use dashboard::{
    ModelSelector, Orchestrator, Outcome, Prepared, Route, Selection, Stats, Status, StatusPanel,
    Ticket, UnitAggregate, resolve_route,
};
