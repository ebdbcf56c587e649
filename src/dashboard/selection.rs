use std::{fmt, str::FromStr};

use anyhow::{Result, bail};

use crate::{common::DateRange, overlay::Capabilities, region::Region};

/// Model variant for regions that publish more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelSelector {
    /// Per-municipality values on a vector-tile choropleth.
    #[default]
    Municipalities,
    /// High-resolution raster grid.
    HighResolutionGrid,
}

impl ModelSelector {
    pub fn to_str(&self) -> &'static str {
        match self {
            ModelSelector::Municipalities => "municipalities",
            ModelSelector::HighResolutionGrid => "grid",
        }
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.to_str()) }
}

impl FromStr for ModelSelector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" | "municipalities" | "municipality" => Ok(Self::Municipalities),
            "grid" | "high-resolution" | "highres" | "hr" => Ok(Self::HighResolutionGrid),
            other => bail!("Unknown model {other:?} (expected municipalities or grid)"),
        }
    }
}

/// What the user asked to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub region: String,
    pub model: ModelSelector,
    pub dates: DateRange,
    /// Observation category key to overlay, if any.
    pub observations: Option<String>,
}

impl Selection {
    pub fn new(region: impl Into<String>, dates: DateRange) -> Self {
        Self { region: region.into(), model: ModelSelector::default(), dates, observations: None }
    }

    pub fn with_model(mut self, model: ModelSelector) -> Self {
        self.model = model;
        self
    }

    pub fn with_observations(mut self, key: impl Into<String>) -> Self {
        self.observations = Some(key.into());
        self
    }
}

/// Which pipeline renders a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Municipality values on a vector-tile map.
    VectorTileChoropleth,
    /// Daily GeoTIFFs averaged and drawn on a tile map.
    RasterGrid,
    /// The region's generic GeoJSON and GeoTIFF, without dates.
    StaticRegion,
}

impl Route {
    pub fn to_str(&self) -> &'static str {
        match self {
            Route::VectorTileChoropleth => "vector-tile choropleth",
            Route::RasterGrid => "raster grid",
            Route::StaticRegion => "static region",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.to_str()) }
}

/// Pick the pipeline for `region`.
///
/// The choropleth needs a municipality model, a vector-tile renderer and an access token;
/// the grid model is selected explicitly, or taken when the choropleth is not possible.
/// The grid also needs raster layers on the tile map. Everything else is the static route.
pub fn resolve_route(region: &Region, model: ModelSelector, caps: Capabilities, has_token: bool) -> Route {
    let sources = &region.sources;
    let has_grid = sources.grid_model.is_some() && caps.raster_layers;
    let vector_tiles = caps.vector_tiles && has_token;

    if sources.municipality_model.is_some() && vector_tiles
        && (model == ModelSelector::Municipalities || !has_grid)
    {
        return Route::VectorTileChoropleth;
    }
    if has_grid { Route::RasterGrid } else { Route::StaticRegion }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{DataSources, GridModel, LatLon, MunicipalityModel, RegionCategory, VectorTileSource};

    fn region(municipal: bool, grid: bool) -> Region {
        let municipality_model = municipal.then(|| MunicipalityModel {
            base_url: "https://m.test".into(),
            file_pattern: "vri_{date}.json".into(),
            max_value: 1.0,
            tiles: VectorTileSource { url: "mapbox://x".into(), source_layer: "m".into(), code_property: "code".into() },
            code_width: Some(5),
            validity: Default::default(),
        });
        let grid_model = grid.then(|| GridModel {
            base_url: "https://g.test".into(),
            file_patterns: vec!["{date}.tif".into()],
            max_value: 1.0,
            validity: Default::default(),
        });
        Region {
            id: "r".into(),
            name: "R".into(),
            category: RegionCategory::Country,
            center: LatLon { lat: 40.0, lon: -3.0 },
            zoom: 6,
            sources: DataSources { municipality_model, grid_model, ..Default::default() },
        }
    }

    const ALL: Capabilities = Capabilities { vector_tiles: true, raster_layers: true };
    const NO_VT: Capabilities = Capabilities { vector_tiles: false, raster_layers: true };

    #[test]
    fn default_model_with_everything_available_is_choropleth() {
        let r = region(true, true);
        assert_eq!(resolve_route(&r, ModelSelector::Municipalities, ALL, true), Route::VectorTileChoropleth);
        assert_eq!(resolve_route(&r, ModelSelector::HighResolutionGrid, ALL, true), Route::RasterGrid);
    }

    #[test]
    fn missing_vector_tiles_or_token_falls_to_grid() {
        let r = region(true, true);
        assert_eq!(resolve_route(&r, ModelSelector::Municipalities, NO_VT, true), Route::RasterGrid);
        assert_eq!(resolve_route(&r, ModelSelector::Municipalities, ALL, false), Route::RasterGrid);
    }

    #[test]
    fn regions_without_models_are_static() {
        assert_eq!(resolve_route(&region(false, false), ModelSelector::HighResolutionGrid, ALL, true), Route::StaticRegion);
        assert_eq!(resolve_route(&region(true, false), ModelSelector::Municipalities, NO_VT, true), Route::StaticRegion);
        let no_raster = Capabilities { vector_tiles: false, raster_layers: false };
        assert_eq!(resolve_route(&region(false, true), ModelSelector::HighResolutionGrid, no_raster, true), Route::StaticRegion);
    }

    #[test]
    fn grid_selector_without_grid_model_uses_choropleth() {
        assert_eq!(resolve_route(&region(true, false), ModelSelector::HighResolutionGrid, ALL, true), Route::VectorTileChoropleth);
    }

    #[test]
    fn selector_parsing() {
        assert_eq!("grid".parse::<ModelSelector>().unwrap(), ModelSelector::HighResolutionGrid);
        assert_eq!("".parse::<ModelSelector>().unwrap(), ModelSelector::Municipalities);
        assert!("hexbins".parse::<ModelSelector>().is_err());
    }
}
