//! In-memory renderers that record the scene instead of drawing it.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use anyhow::{Result, bail, ensure};
use serde_json::Value;

use crate::{common::lock, raster::RasterGrid};

use super::{
    BackendKind, Capabilities, ColorRule, LayerHandle, MapView, PaintKind, PaintLayer,
    PixelColorFn, RendererFactory, SourceSpec, TileLayer, TileRenderer, VectorTileRenderer,
    layer::feature_count,
};

/// A layer as currently drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveLayer {
    /// Display label (tile maps) or paint layer id (vector-tile maps).
    pub id: String,
    pub handle: Option<LayerHandle>,
    pub kind: &'static str,
    pub visible: bool,
    pub opacity: f64,
    /// Features, markers, units or pixels in the layer.
    pub items: usize,
    /// Items drawn with a color (not transparent).
    pub colored: usize,
}

/// State of one live map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSnapshot {
    pub id: usize,
    pub kind: BackendKind,
    pub view: MapView,
    pub style_url: Option<String>,
    pub layers: Vec<LiveLayer>,
    pub sources: Vec<String>,
}

impl MapSnapshot {
    pub fn layer(&self, id: &str) -> Option<&LiveLayer> { self.layers.iter().find(|l| l.id == id) }

    pub fn layer_ids(&self) -> Vec<&str> { self.layers.iter().map(|l| l.id.as_str()).collect() }
}

/// Everything the headless renderers have seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneSnapshot {
    pub created: usize,
    pub destroyed: usize,
    /// Maps created and not yet destroyed.
    pub maps: Vec<MapSnapshot>,
}

impl SceneSnapshot {
    /// The live map, if exactly one exists.
    pub fn live_map(&self) -> Option<&MapSnapshot> {
        match self.maps.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn live_backend(&self) -> Option<BackendKind> { self.live_map().map(|m| m.kind) }
}

#[derive(Default)]
struct MapState {
    snapshot: Option<MapSnapshot>,
    sources: BTreeMap<String, SourceSpec>,
}

#[derive(Default)]
struct Scene {
    created: usize,
    destroyed: usize,
    next_handle: u64,
    maps: BTreeMap<usize, MapState>,
}

impl Scene {
    fn open(&mut self, kind: BackendKind, view: MapView, style_url: Option<String>) -> usize {
        let id = self.created;
        self.created += 1;
        let snapshot = MapSnapshot { id, kind, view, style_url, layers: Vec::new(), sources: Vec::new() };
        self.maps.insert(id, MapState { snapshot: Some(snapshot), sources: BTreeMap::new() });
        id
    }

    fn close(&mut self, id: usize) {
        if self.maps.remove(&id).is_some() { self.destroyed += 1 }
    }

    fn map(&mut self, id: usize) -> Option<&mut MapSnapshot> {
        self.maps.get_mut(&id).and_then(|m| m.snapshot.as_mut())
    }
}

/// Renderer factory whose maps live in memory. Clones share the same scene.
#[derive(Clone, Default)]
pub struct HeadlessRenderers {
    capabilities: Capabilities,
    scene: Arc<Mutex<Scene>>,
}

impl HeadlessRenderers {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities, scene: Arc::default() }
    }

    /// Only tile maps, e.g. when no vector-tile renderer is installed.
    pub fn tile_only() -> Self {
        Self::new(Capabilities { vector_tiles: false, raster_layers: true })
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        let scene = lock(&self.scene);
        SceneSnapshot {
            created: scene.created,
            destroyed: scene.destroyed,
            maps: scene.maps.values().filter_map(|m| m.snapshot.clone()).collect(),
        }
    }
}

impl RendererFactory for HeadlessRenderers {
    fn capabilities(&self) -> Capabilities { self.capabilities }

    fn create_tile_map(&self, view: MapView) -> Result<Box<dyn TileRenderer>> {
        let id = lock(&self.scene).open(BackendKind::Tile, view, None);
        Ok(Box::new(HeadlessTileMap { id, scene: self.scene.clone() }))
    }

    fn create_vector_tile_map(&self, view: MapView, style_url: &str, access_token: &str) -> Result<Box<dyn VectorTileRenderer>> {
        ensure!(self.capabilities.vector_tiles, "[HeadlessRenderers.create_vector_tile_map] vector tiles are not installed");
        ensure!(!access_token.trim().is_empty(), "[HeadlessRenderers.create_vector_tile_map] missing access token");
        let id = lock(&self.scene).open(BackendKind::VectorTile, view, Some(style_url.to_string()));
        Ok(Box::new(HeadlessVectorTileMap { id, scene: self.scene.clone() }))
    }
}

fn colored_pixels(grid: &RasterGrid, color: &PixelColorFn) -> (usize, usize) {
    let mut colored = 0;
    for row in 0..grid.height() {
        for col in 0..grid.width() {
            if color(&grid.pixel(row, col)).is_some() { colored += 1 }
        }
    }
    (grid.width() * grid.height(), colored)
}

struct HeadlessTileMap {
    id: usize,
    scene: Arc<Mutex<Scene>>,
}

impl HeadlessTileMap {
    fn with_layer(&self, handle: LayerHandle, f: impl FnOnce(&mut LiveLayer)) {
        let mut scene = lock(&self.scene);
        if let Some(layer) = scene.map(self.id).and_then(|m| m.layers.iter_mut().find(|l| l.handle == Some(handle))) {
            f(layer);
        }
    }
}

impl TileRenderer for HeadlessTileMap {
    fn set_view(&mut self, view: MapView) {
        if let Some(map) = lock(&self.scene).map(self.id) { map.view = view }
    }

    fn add_layer(&mut self, label: &str, layer: TileLayer) -> LayerHandle {
        let (kind, items, colored, opacity) = match &layer {
            TileLayer::GeoJson { data, style, opacity } => {
                let colored = data["features"].as_array().into_iter().flatten()
                    .filter(|feature| style(*feature).fill.is_some())
                    .count();
                ("geojson", feature_count(data), colored, *opacity)
            }
            TileLayer::Raster { grid, color, opacity } => {
                let (items, colored) = colored_pixels(grid, color);
                ("raster", items, colored, *opacity)
            }
            TileLayer::Markers { markers } => ("markers", markers.len(), markers.len(), 1.0),
        };

        let mut scene = lock(&self.scene);
        let handle = LayerHandle(scene.next_handle);
        scene.next_handle += 1;
        if let Some(map) = scene.map(self.id) {
            map.layers.push(LiveLayer {
                id: label.to_string(),
                handle: Some(handle),
                kind,
                visible: true,
                opacity,
                items,
                colored,
            });
        }
        handle
    }

    fn remove_layer(&mut self, handle: LayerHandle) {
        if let Some(map) = lock(&self.scene).map(self.id) {
            map.layers.retain(|l| l.handle != Some(handle));
        }
    }

    fn set_layer_visible(&mut self, handle: LayerHandle, visible: bool) {
        self.with_layer(handle, |layer| layer.visible = visible);
    }

    fn set_layer_opacity(&mut self, handle: LayerHandle, opacity: f64) {
        self.with_layer(handle, |layer| layer.opacity = opacity);
    }

    fn destroy(&mut self) { lock(&self.scene).close(self.id) }
}

struct HeadlessVectorTileMap {
    id: usize,
    scene: Arc<Mutex<Scene>>,
}

impl HeadlessVectorTileMap {
    fn with_layer(&self, id: &str, f: impl FnOnce(&mut LiveLayer)) {
        let mut scene = lock(&self.scene);
        if let Some(layer) = scene.map(self.id).and_then(|m| m.layers.iter_mut().find(|l| l.id == id)) {
            f(layer);
        }
    }
}

fn count_with_property(data: &Value, property: &str) -> usize {
    data["features"].as_array().into_iter().flatten()
        .filter(|feature| feature["properties"][property].is_string())
        .count()
}

impl VectorTileRenderer for HeadlessVectorTileMap {
    fn set_view(&mut self, view: MapView) {
        if let Some(map) = lock(&self.scene).map(self.id) { map.view = view }
    }

    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<()> {
        let mut scene = lock(&self.scene);
        let Some(state) = scene.maps.get_mut(&self.id) else { bail!("map {} was destroyed", self.id) };
        ensure!(!state.sources.contains_key(id), "There is already a source with id {id:?}");
        state.sources.insert(id.to_string(), source);
        if let Some(map) = state.snapshot.as_mut() { map.sources.push(id.to_string()) }
        Ok(())
    }

    fn remove_source(&mut self, id: &str) {
        let mut scene = lock(&self.scene);
        if let Some(state) = scene.maps.get_mut(&self.id) {
            state.sources.remove(id);
            if let Some(map) = state.snapshot.as_mut() { map.sources.retain(|s| s != id) }
        }
    }

    fn add_layer(&mut self, layer: PaintLayer) -> Result<()> {
        let mut scene = lock(&self.scene);
        let Some(state) = scene.maps.get_mut(&self.id) else { bail!("map {} was destroyed", self.id) };
        let Some(source) = state.sources.get(&layer.source) else {
            bail!("Layer {:?} references missing source {:?}", layer.id, layer.source);
        };

        let (items, colored) = match (source, &layer.color) {
            (SourceSpec::VectorTiles { .. }, ColorRule::Match { colors, .. }) => (colors.len(), colors.len()),
            (SourceSpec::GeoJson { data }, ColorRule::Property(property)) => {
                (feature_count(data), count_with_property(data, property))
            }
            (SourceSpec::GeoJson { data }, _) => (feature_count(data), 0),
            (SourceSpec::Raster { grid, color }, _) => colored_pixels(grid, color),
            (SourceSpec::VectorTiles { .. }, _) => (0, 0),
        };
        let kind = match layer.kind {
            PaintKind::Fill => "fill",
            PaintKind::Circle => "circle",
            PaintKind::Raster => "raster",
        };

        let Some(map) = state.snapshot.as_mut() else { bail!("map {} was destroyed", self.id) };
        ensure!(map.layer(&layer.id).is_none(), "There is already a layer with id {:?}", layer.id);
        map.layers.push(LiveLayer {
            id: layer.id,
            handle: None,
            kind,
            visible: true,
            opacity: layer.opacity,
            items,
            colored,
        });
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) {
        if let Some(map) = lock(&self.scene).map(self.id) { map.layers.retain(|l| l.id != id) }
    }

    fn set_layer_visible(&mut self, id: &str, visible: bool) {
        self.with_layer(id, |layer| layer.visible = visible);
    }

    fn set_paint_opacity(&mut self, id: &str, opacity: f64) {
        self.with_layer(id, |layer| layer.opacity = opacity);
    }

    fn destroy(&mut self) { lock(&self.scene).close(self.id) }
}
