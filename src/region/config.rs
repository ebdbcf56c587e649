use std::{collections::HashSet, fs, path::Path, time::Duration};

use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;

use super::region::Region;

/// Environment variable consulted when the config file carries no access token.
pub const ACCESS_TOKEN_ENV: &str = "VECTORISK_ACCESS_TOKEN";

fn default_timeout_secs() -> u64 { 10 }
fn default_user_agent() -> String { format!("vectorisk/{}", env!("CARGO_PKG_VERSION")) }
fn default_style_url() -> String { "mapbox://styles/mapbox/light-v11".into() }
fn default_opacity() -> f64 { 0.7 }
fn default_max_range_days() -> usize { 366 }

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Access token for the vector-tile renderer.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_style_url")]
    pub vector_style_url: String,
    /// Initial overlay opacity in [0, 1].
    #[serde(default = "default_opacity")]
    pub overlay_opacity: f64,
    /// Longest date range, in days, a model selection may request.
    #[serde(default = "default_max_range_days")]
    pub max_range_days: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            access_token: None,
            vector_style_url: default_style_url(),
            overlay_opacity: default_opacity(),
            max_range_days: default_max_range_days(),
        }
    }
}

impl Settings {
    #[inline]
    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

    /// Configured token, falling back to the environment. Blank tokens count as absent.
    pub fn resolved_access_token(&self) -> Option<String> {
        self.access_token.clone()
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
            .filter(|token| !token.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(text)
            .context("Failed to parse TOML configuration")?;
        config.settings.access_token = config.settings.resolved_access_token();
        config.validate()?;
        Ok(config)
    }

    /// Presence checks only; upstream data is not probed.
    fn validate(&self) -> Result<()> {
        ensure!(self.settings.request_timeout_secs > 0, "request_timeout_secs must be positive");
        ensure!(
            (0.0..=1.0).contains(&self.settings.overlay_opacity),
            "overlay_opacity must be within [0, 1], got {}", self.settings.overlay_opacity
        );

        let mut seen = HashSet::new();
        for region in &self.regions {
            ensure!(!region.id.trim().is_empty(), "Region with empty id ({:?})", region.name);
            if !seen.insert(region.id.as_str()) {
                bail!("Duplicate region id {:?}", region.id);
            }
            ensure!(
                region.center.lat.is_finite() && region.center.lon.is_finite(),
                "Region {:?} has a non-finite center", region.id
            );

            let sources = &region.sources;
            if let Some(model) = &sources.municipality_model {
                ensure!(!model.base_url.is_empty(), "Region {:?}: municipality_model.base_url is empty", region.id);
                ensure!(!model.file_pattern.is_empty(), "Region {:?}: municipality_model.file_pattern is empty", region.id);
                ensure!(model.max_value > 0.0, "Region {:?}: municipality_model.max_value must be positive", region.id);
            }
            if let Some(model) = &sources.grid_model {
                ensure!(!model.base_url.is_empty(), "Region {:?}: grid_model.base_url is empty", region.id);
                ensure!(!model.file_patterns.is_empty(), "Region {:?}: grid_model.file_patterns is empty", region.id);
                ensure!(model.max_value > 0.0, "Region {:?}: grid_model.max_value must be positive", region.id);
            }
            if let Some(max) = sources.max_value {
                ensure!(max > 0.0, "Region {:?}: max_value must be positive", region.id);
            }
        }
        Ok(())
    }

    #[inline]
    pub fn region_table(&self) -> RegionTable { RegionTable::new(self.regions.clone()) }
}

/// Read-only lookup over the configured regions, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    regions: Vec<Region>,
}

impl RegionTable {
    pub fn new(regions: Vec<Region>) -> Self { Self { regions } }

    pub fn get(&self, id: &str) -> Option<&Region> { self.regions.iter().find(|r| r.id == id) }

    pub fn iter(&self) -> impl Iterator<Item = &Region> { self.regions.iter() }

    #[inline] pub fn len(&self) -> usize { self.regions.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.regions.is_empty() }
}
