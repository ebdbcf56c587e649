use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use anyhow::{Result, bail};
use geo::Point;
use serde_json::Value;

use crate::{common::Rgb, raster::RasterGrid, region::VectorTileSource};

/// Logical overlay slots. Each slot holds at most one live layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OverlayName {
    Risk,           // Choropleth or generic vector layer
    Observations,   // Citizen-science points
    RasterGrid,     // High-resolution or generic raster
}

impl OverlayName {
    pub fn to_str(&self) -> &'static str {
        match self {
            OverlayName::Risk => "risk",
            OverlayName::Observations => "observations",
            OverlayName::RasterGrid => "raster-grid",
        }
    }

    pub fn order() -> [OverlayName; 3] {
        [OverlayName::Risk, OverlayName::RasterGrid, OverlayName::Observations]
    }
}

impl fmt::Display for OverlayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.to_str()) }
}

impl FromStr for OverlayName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "risk" => Ok(Self::Risk),
            "observations" => Ok(Self::Observations),
            "raster-grid" => Ok(Self::RasterGrid),
            other => bail!("Unknown overlay {other:?}"),
        }
    }
}

/// Opaque id of a layer on a tile map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerHandle(pub u64);

/// Path styling for one vector feature. `fill: None` draws the feature transparent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathStyle {
    pub fill: Option<Rgb>,
    pub stroke: Rgb,
    pub weight: f64,
}

impl Default for PathStyle {
    fn default() -> Self { Self { fill: None, stroke: Rgb::new(0x44, 0x44, 0x44), weight: 0.5 } }
}

/// A point marker (lon, lat).
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub position: Point<f64>,
    pub color: Rgb,
    pub radius: f64,
    /// Popup text.
    pub label: Option<String>,
}

/// Per-feature style callback.
pub type StyleFn = Arc<dyn Fn(&Value) -> PathStyle + Send + Sync>;

/// Per-pixel color callback; receives the pixel's values across bands. `None` is transparent.
pub type PixelColorFn = Arc<dyn Fn(&[f64]) -> Option<Rgb> + Send + Sync>;

/// Backend-agnostic description of an overlay.
#[derive(Clone)]
pub enum OverlaySpec {
    /// Unit colors keyed by code, drawn on a vector-tile polygon source.
    Choropleth { tiles: VectorTileSource, colors: BTreeMap<String, Rgb> },
    /// GeoJSON features styled per feature.
    Features { data: Arc<Value>, style: StyleFn },
    /// Raster grid colored per pixel.
    Raster { grid: Arc<RasterGrid>, color: PixelColorFn },
    Points { markers: Vec<Marker> },
}

impl OverlaySpec {
    /// Whether the global overlay opacity applies. Point markers always stay opaque.
    #[inline]
    pub fn follows_opacity(&self) -> bool { !matches!(self, OverlaySpec::Points { .. }) }
}

impl fmt::Debug for OverlaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Choropleth { tiles, colors } => write!(f, "Choropleth({}, {} units)", tiles.url, colors.len()),
            Self::Features { data, .. } => write!(f, "Features({} features)", feature_count(data)),
            Self::Raster { grid, .. } => write!(f, "Raster({}x{}x{})", grid.bands(), grid.height(), grid.width()),
            Self::Points { markers } => write!(f, "Points({})", markers.len()),
        }
    }
}

/// Native layer object for a tile-based map.
#[derive(Clone)]
pub enum TileLayer {
    GeoJson { data: Arc<Value>, style: StyleFn, opacity: f64 },
    Raster { grid: Arc<RasterGrid>, color: PixelColorFn, opacity: f64 },
    Markers { markers: Vec<Marker> },
}

impl fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeoJson { data, opacity, .. } => write!(f, "GeoJson({} features, opacity {opacity})", feature_count(data)),
            Self::Raster { grid, opacity, .. } => write!(f, "Raster({}x{}, opacity {opacity})", grid.height(), grid.width()),
            Self::Markers { markers } => write!(f, "Markers({})", markers.len()),
        }
    }
}

/// Source registered on a vector-tile map.
#[derive(Clone)]
pub enum SourceSpec {
    VectorTiles { url: String },
    GeoJson { data: Arc<Value> },
    Raster { grid: Arc<RasterGrid>, color: PixelColorFn },
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VectorTiles { url } => write!(f, "VectorTiles({url})"),
            Self::GeoJson { data } => write!(f, "GeoJson({} features)", feature_count(data)),
            Self::Raster { grid, .. } => write!(f, "Raster({}x{})", grid.height(), grid.width()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintKind {
    Fill,
    Circle,
    Raster,
}

/// Data-driven color for a paint layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorRule {
    /// Look the feature's `property` up in `colors`; unmatched features are transparent.
    Match { property: String, colors: BTreeMap<String, Rgb> },
    /// Read a hex color from the feature's `property`.
    Property(String),
    /// Colors come from the source itself (raster sources).
    Source,
}

/// Paint layer on a vector-tile map.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintLayer {
    pub id: String,
    pub source: String,
    pub source_layer: Option<String>,
    pub kind: PaintKind,
    pub color: ColorRule,
    pub opacity: f64,
}

pub(crate) fn feature_count(data: &Value) -> usize {
    data["features"].as_array().map_or(0, Vec::len)
}
