mod backend;
mod headless;
mod layer;
mod manager;

pub use backend::{BackendKind, Capabilities, MapBackend, MapView, RendererFactory, TileRenderer, VectorTileRenderer};
pub use headless::{HeadlessRenderers, LiveLayer, MapSnapshot, SceneSnapshot};
pub use layer::{
    ColorRule, LayerHandle, Marker, OverlayName, OverlaySpec, PaintKind, PaintLayer, PathStyle,
    PixelColorFn, SourceSpec, StyleFn, TileLayer,
};
pub use manager::OverlayManager;
