use std::fmt;

use anyhow::Result;

use crate::region::{LatLon, Region};

use super::{LayerHandle, PaintLayer, SourceSpec, TileLayer};

/// Map viewport: center and zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    pub center: LatLon,
    pub zoom: u8,
}

impl MapView {
    #[inline] pub fn of(region: &Region) -> Self { Self { center: region.center, zoom: region.zoom } }
}

/// Which renderer kinds are installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub vector_tiles: bool,
    /// Tile maps can draw raster grids.
    pub raster_layers: bool,
}

impl Default for Capabilities {
    fn default() -> Self { Self { vector_tiles: true, raster_layers: true } }
}

/// Tile-based map (Leaflet-like).
pub trait TileRenderer: Send {
    fn set_view(&mut self, view: MapView);
    /// Attach `layer` under a display `label`.
    fn add_layer(&mut self, label: &str, layer: TileLayer) -> LayerHandle;
    fn remove_layer(&mut self, handle: LayerHandle);
    fn set_layer_visible(&mut self, handle: LayerHandle, visible: bool);
    fn set_layer_opacity(&mut self, handle: LayerHandle, opacity: f64);
    /// Release the map and everything attached to it.
    fn destroy(&mut self);
}

/// Vector-tile map (Mapbox GL-like).
pub trait VectorTileRenderer: Send {
    fn set_view(&mut self, view: MapView);
    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<()>;
    fn remove_source(&mut self, id: &str);
    fn add_layer(&mut self, layer: PaintLayer) -> Result<()>;
    fn remove_layer(&mut self, id: &str);
    fn set_layer_visible(&mut self, id: &str, visible: bool);
    fn set_paint_opacity(&mut self, id: &str, opacity: f64);
    fn destroy(&mut self);
}

/// Creates native maps for whichever renderers are installed.
pub trait RendererFactory {
    fn capabilities(&self) -> Capabilities;
    fn create_tile_map(&self, view: MapView) -> Result<Box<dyn TileRenderer>>;
    fn create_vector_tile_map(&self, view: MapView, style_url: &str, access_token: &str) -> Result<Box<dyn VectorTileRenderer>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Tile,
    VectorTile,
}

impl BackendKind {
    pub fn to_str(&self) -> &'static str {
        match self {
            BackendKind::Tile => "tile",
            BackendKind::VectorTile => "vector-tile",
        }
    }
}

/// The mounted map, whichever kind it is.
pub enum MapBackend {
    Tile(Box<dyn TileRenderer>),
    VectorTile(Box<dyn VectorTileRenderer>),
}

impl MapBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            MapBackend::Tile(_) => BackendKind::Tile,
            MapBackend::VectorTile(_) => BackendKind::VectorTile,
        }
    }

    pub fn set_view(&mut self, view: MapView) {
        match self {
            MapBackend::Tile(map) => map.set_view(view),
            MapBackend::VectorTile(map) => map.set_view(view),
        }
    }

    pub(crate) fn destroy(&mut self) {
        match self {
            MapBackend::Tile(map) => map.destroy(),
            MapBackend::VectorTile(map) => map.destroy(),
        }
    }
}

impl fmt::Debug for MapBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "MapBackend({})", self.kind().to_str()) }
}
