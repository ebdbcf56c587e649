use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Result, bail};
use serde_json::{Value, json};
use tracing::debug;

use super::{
    BackendKind, ColorRule, LayerHandle, MapBackend, MapView, Marker, OverlayName, OverlaySpec,
    PaintKind, PaintLayer, SourceSpec, TileLayer,
};

/// Feature property that carries baked per-feature fill colors on vector-tile maps.
const FILL_PROPERTY: &str = "overlay_fill";
const MARKER_COLOR_PROPERTY: &str = "marker_color";

#[derive(Debug)]
enum Slot {
    Tile(LayerHandle),
    VectorTile { source: String, layer: String },
}

#[derive(Debug)]
struct ActiveOverlay {
    slot: Slot,
    visible: bool,
    follows_opacity: bool,
}

/// Owns the mounted map and the named-overlay registry.
///
/// All overlay mutation goes through here, so each name has at most one live native layer
/// and callers never branch on the backend kind.
#[derive(Debug)]
pub struct OverlayManager {
    backend: Option<MapBackend>,
    active: BTreeMap<OverlayName, ActiveOverlay>,
    opacity: f64,
}

impl Default for OverlayManager {
    fn default() -> Self { Self::new(1.0) }
}

impl OverlayManager {
    pub fn new(opacity: f64) -> Self {
        Self { backend: None, active: BTreeMap::new(), opacity: opacity.clamp(0.0, 1.0) }
    }

    /// Mount `backend`, tearing down any map that is already mounted.
    pub fn mount(&mut self, backend: MapBackend) {
        self.unmount();
        debug!("Mounting {} map", backend.kind().to_str());
        self.backend = Some(backend);
    }

    /// Destroy the mounted map and forget its overlays. Returns the kind that was mounted.
    pub fn unmount(&mut self) -> Option<BackendKind> {
        let mut backend = self.backend.take()?;
        let kind = backend.kind();
        debug!("Tearing down {} map ({} overlays)", kind.to_str(), self.active.len());
        self.active.clear();
        backend.destroy();
        Some(kind)
    }

    #[inline] pub fn backend_kind(&self) -> Option<BackendKind> { self.backend.as_ref().map(MapBackend::kind) }

    #[inline] pub fn opacity(&self) -> f64 { self.opacity }

    #[inline] pub fn is_active(&self, name: OverlayName) -> bool { self.active.contains_key(&name) }

    pub fn is_visible(&self, name: OverlayName) -> Option<bool> { self.active.get(&name).map(|o| o.visible) }

    /// Names with a live layer, in slot order.
    pub fn active(&self) -> Vec<OverlayName> { self.active.keys().copied().collect() }

    pub fn set_view(&mut self, view: MapView) {
        if let Some(backend) = self.backend.as_mut() { backend.set_view(view) }
    }

    /// Attach `spec` under `name`, first removing any layer already there.
    pub fn add_overlay(&mut self, name: OverlayName, spec: OverlaySpec, visible: bool) -> Result<()> {
        self.remove_overlay(name);

        let opacity = if spec.follows_opacity() { self.opacity } else { 1.0 };
        let follows_opacity = spec.follows_opacity();
        let Some(backend) = self.backend.as_mut() else {
            bail!("[OverlayManager.add_overlay] no map mounted for overlay {name}");
        };

        let slot = match backend {
            MapBackend::Tile(map) => {
                let layer = match spec {
                    OverlaySpec::Features { data, style } => TileLayer::GeoJson { data, style, opacity },
                    OverlaySpec::Raster { grid, color } => TileLayer::Raster { grid, color, opacity },
                    OverlaySpec::Points { markers } => TileLayer::Markers { markers },
                    OverlaySpec::Choropleth { .. } => {
                        bail!("[OverlayManager.add_overlay] {name}: choropleths need a vector-tile map")
                    }
                };
                let handle = map.add_layer(name.to_str(), layer);
                if !visible { map.set_layer_visible(handle, false) }
                Slot::Tile(handle)
            }
            MapBackend::VectorTile(map) => {
                let source_id = format!("{name}-source");
                let layer_id = format!("{name}-layer");
                let (source, source_layer, kind, color) = vector_tile_parts(spec);

                map.add_source(&source_id, source)?;
                let layer = PaintLayer {
                    id: layer_id.clone(),
                    source: source_id.clone(),
                    source_layer,
                    kind,
                    color,
                    opacity,
                };
                if let Err(e) = map.add_layer(layer) {
                    map.remove_source(&source_id);
                    return Err(e);
                }
                if !visible { map.set_layer_visible(&layer_id, false) }
                Slot::VectorTile { source: source_id, layer: layer_id }
            }
        };

        debug!("Added overlay {name} (visible: {visible})");
        self.active.insert(name, ActiveOverlay { slot, visible, follows_opacity });
        Ok(())
    }

    /// Detach the layer under `name`. Returns whether one was there.
    pub fn remove_overlay(&mut self, name: OverlayName) -> bool {
        let Some(overlay) = self.active.remove(&name) else { return false };
        match (self.backend.as_mut(), overlay.slot) {
            (Some(MapBackend::Tile(map)), Slot::Tile(handle)) => map.remove_layer(handle),
            (Some(MapBackend::VectorTile(map)), Slot::VectorTile { source, layer }) => {
                map.remove_layer(&layer);
                map.remove_source(&source);
            }
            _ => {}
        }
        debug!("Removed overlay {name}");
        true
    }

    /// Show or hide `name`. Unknown names are ignored.
    pub fn set_visibility(&mut self, name: OverlayName, visible: bool) {
        let Some(overlay) = self.active.get_mut(&name) else { return };
        overlay.visible = visible;
        match (self.backend.as_mut(), &overlay.slot) {
            (Some(MapBackend::Tile(map)), Slot::Tile(handle)) => map.set_layer_visible(*handle, visible),
            (Some(MapBackend::VectorTile(map)), Slot::VectorTile { layer, .. }) => map.set_layer_visible(layer, visible),
            _ => {}
        }
    }

    /// Apply `value` to every overlay that follows opacity, on whichever map is mounted.
    /// Overlays added later pick the value up as well.
    pub fn set_opacity(&mut self, value: f64) {
        self.opacity = if value.is_finite() { value.clamp(0.0, 1.0) } else { 1.0 };
        let Some(backend) = self.backend.as_mut() else { return };
        for overlay in self.active.values().filter(|o| o.follows_opacity) {
            match (&mut *backend, &overlay.slot) {
                (MapBackend::Tile(map), Slot::Tile(handle)) => map.set_layer_opacity(*handle, self.opacity),
                (MapBackend::VectorTile(map), Slot::VectorTile { layer, .. }) => map.set_paint_opacity(layer, self.opacity),
                _ => {}
            }
        }
    }
}

/// Source, source layer, paint kind and color rule for `spec` on a vector-tile map.
fn vector_tile_parts(spec: OverlaySpec) -> (SourceSpec, Option<String>, PaintKind, ColorRule) {
    match spec {
        OverlaySpec::Choropleth { tiles, colors } => (
            SourceSpec::VectorTiles { url: tiles.url },
            Some(tiles.source_layer),
            PaintKind::Fill,
            ColorRule::Match { property: tiles.code_property, colors },
        ),
        OverlaySpec::Features { data, style } => {
            let mut baked = (*data).clone();
            if let Some(features) = baked.get_mut("features").and_then(Value::as_array_mut) {
                for feature in features {
                    let Some(fill) = style(&*feature).fill else { continue };
                    let Some(obj) = feature.as_object_mut() else { continue };
                    let props = obj.entry("properties").or_insert_with(|| json!({}));
                    if !props.is_object() { *props = json!({}) }
                    if let Some(props) = props.as_object_mut() {
                        props.insert(FILL_PROPERTY.to_string(), Value::String(fill.to_string()));
                    }
                }
            }
            (
                SourceSpec::GeoJson { data: Arc::new(baked) },
                None,
                PaintKind::Fill,
                ColorRule::Property(FILL_PROPERTY.to_string()),
            )
        }
        OverlaySpec::Raster { grid, color } => (SourceSpec::Raster { grid, color }, None, PaintKind::Raster, ColorRule::Source),
        OverlaySpec::Points { markers } => (
            SourceSpec::GeoJson { data: Arc::new(markers_to_geojson(&markers)) },
            None,
            PaintKind::Circle,
            ColorRule::Property(MARKER_COLOR_PROPERTY.to_string()),
        ),
    }
}

fn markers_to_geojson(markers: &[Marker]) -> Value {
    let features: Vec<Value> = markers.iter().map(|m| json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [m.position.x(), m.position.y()] },
        "properties": { MARKER_COLOR_PROPERTY: m.color.to_string(), "radius": m.radius, "label": m.label },
    })).collect();
    json!({ "type": "FeatureCollection", "features": features })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::Rgb,
        overlay::{HeadlessRenderers, PathStyle, RendererFactory, StyleFn},
        region::{LatLon, VectorTileSource},
    };
    use geo::Point;

    fn view() -> MapView { MapView { center: LatLon { lat: 41.4, lon: 2.2 }, zoom: 8 } }

    fn features(n: usize) -> OverlaySpec {
        let features: Vec<Value> = (0..n).map(|i| json!({ "type": "Feature", "properties": { "value": i } })).collect();
        let style: StyleFn = Arc::new(|_| PathStyle { fill: Some(Rgb::new(1, 2, 3)), ..PathStyle::default() });
        OverlaySpec::Features { data: Arc::new(json!({ "type": "FeatureCollection", "features": features })), style }
    }

    fn choropleth() -> OverlaySpec {
        let tiles = VectorTileSource {
            url: "mapbox://example.munis".into(),
            source_layer: "munis".into(),
            code_property: "natcode".into(),
        };
        let colors = BTreeMap::from([("08019".to_string(), Rgb::new(9, 9, 9))]);
        OverlaySpec::Choropleth { tiles, colors }
    }

    fn tile_manager(renderers: &HeadlessRenderers) -> OverlayManager {
        let mut manager = OverlayManager::new(0.7);
        manager.mount(MapBackend::Tile(renderers.create_tile_map(view()).unwrap()));
        manager
    }

    #[test]
    fn adding_same_name_replaces_previous_layer() {
        let renderers = HeadlessRenderers::default();
        let mut manager = tile_manager(&renderers);

        manager.add_overlay(OverlayName::Risk, features(2), true).unwrap();
        manager.add_overlay(OverlayName::Risk, features(5), true).unwrap();

        let scene = renderers.snapshot();
        let map = scene.live_map().unwrap();
        assert_eq!(map.layers.len(), 1);
        assert_eq!(map.layers[0].items, 5);
        assert_eq!(manager.active(), vec![OverlayName::Risk]);
    }

    #[test]
    fn visibility_of_missing_layer_is_a_no_op() {
        let renderers = HeadlessRenderers::default();
        let mut manager = tile_manager(&renderers);
        manager.set_visibility(OverlayName::Observations, false);
        assert_eq!(manager.is_visible(OverlayName::Observations), None);
        assert!(renderers.snapshot().live_map().unwrap().layers.is_empty());
    }

    #[test]
    fn opacity_applies_to_every_backend() {
        let renderers = HeadlessRenderers::default();
        let mut manager = tile_manager(&renderers);
        manager.add_overlay(OverlayName::Risk, features(1), true).unwrap();
        let marker = Marker { position: Point::new(2.0, 41.0), color: Rgb::new(0, 0, 0), radius: 4.0, label: None };
        manager.add_overlay(OverlayName::Observations, OverlaySpec::Points { markers: vec![marker] }, true).unwrap();
        manager.set_opacity(0.3);

        let map = renderers.snapshot().live_map().cloned().unwrap();
        assert_eq!(map.layer("risk").unwrap().opacity, 0.3);
        assert_eq!(map.layer("observations").unwrap().opacity, 1.0);

        let vt = renderers.create_vector_tile_map(view(), "style", "token").unwrap();
        manager.mount(MapBackend::VectorTile(vt));
        manager.add_overlay(OverlayName::Risk, choropleth(), true).unwrap();
        manager.set_opacity(0.5);
        let map = renderers.snapshot().live_map().cloned().unwrap();
        assert_eq!(map.layer("risk-layer").unwrap().opacity, 0.5);
    }

    #[test]
    fn mount_tears_down_previous_map() {
        let renderers = HeadlessRenderers::default();
        let mut manager = tile_manager(&renderers);
        manager.add_overlay(OverlayName::Risk, features(1), true).unwrap();

        manager.mount(MapBackend::VectorTile(renderers.create_vector_tile_map(view(), "s", "t").unwrap()));
        let scene = renderers.snapshot();
        assert_eq!(scene.maps.len(), 1);
        assert_eq!(scene.destroyed, 1);
        assert!(manager.active().is_empty());
        assert_eq!(manager.backend_kind(), Some(BackendKind::VectorTile));
    }

    #[test]
    fn choropleth_needs_vector_tiles() {
        let renderers = HeadlessRenderers::default();
        let mut manager = tile_manager(&renderers);
        assert!(manager.add_overlay(OverlayName::Risk, choropleth(), true).is_err());
        assert!(!manager.is_active(OverlayName::Risk));

        let mut unmounted = OverlayManager::default();
        assert!(unmounted.add_overlay(OverlayName::Risk, features(1), true).is_err());
    }

    #[test]
    fn hidden_overlay_starts_hidden_and_can_be_removed() {
        let renderers = HeadlessRenderers::default();
        let mut manager = OverlayManager::default();
        manager.mount(MapBackend::VectorTile(renderers.create_vector_tile_map(view(), "s", "t").unwrap()));
        manager.add_overlay(OverlayName::Risk, features(3), false).unwrap();

        let map = renderers.snapshot().live_map().cloned().unwrap();
        let layer = map.layer("risk-layer").unwrap();
        assert!(!layer.visible);
        assert_eq!(layer.colored, 3);

        assert!(manager.remove_overlay(OverlayName::Risk));
        assert!(!manager.remove_overlay(OverlayName::Risk));
        let map = renderers.snapshot().live_map().cloned().unwrap();
        assert!(map.layers.is_empty() && map.sources.is_empty());
    }
}
