use std::{borrow::Cow, sync::OnceLock};

use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::{common::compact_date, raster::Validity};

/// Geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionCategory {
    Country,
    City,
}

/// A dashboard region. Loaded once from configuration and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub category: RegionCategory,
    pub center: LatLon,
    pub zoom: u8,
    #[serde(default)]
    pub sources: DataSources,
}

impl Region {
    /// True if the region has any date-parameterized model source.
    #[inline]
    pub fn has_model(&self) -> bool {
        self.sources.municipality_model.is_some() || self.sources.grid_model.is_some()
    }
}

fn sentinel_only() -> Validity { Validity::SentinelOnly }

/// Named endpoints a region may define. Every entry is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSources {
    /// Generic vector layer (GeoJSON).
    pub vector: Option<String>,
    /// Generic raster layer (GeoTIFF).
    pub raster: Option<String>,
    #[serde(default = "sentinel_only")]
    pub raster_validity: Validity,
    /// Upper bound for coloring the generic layers; the data maximum is used when absent.
    pub max_value: Option<f64>,
    /// Generic tabular time series (CSV, optionally gzipped).
    pub timeseries_csv: Option<String>,
    /// Higher-priority JSON time series.
    pub timeseries_json: Option<String>,
    /// Per-subregion time series; `{code}` is replaced by the unit code.
    pub subregion_series: Option<String>,
    pub municipality_model: Option<MunicipalityModel>,
    pub grid_model: Option<GridModel>,
    pub observations: Option<ObservationSource>,
}

impl Default for DataSources {
    fn default() -> Self {
        Self {
            vector: None,
            raster: None,
            raster_validity: sentinel_only(),
            max_value: None,
            timeseries_csv: None,
            timeseries_json: None,
            subregion_series: None,
            municipality_model: None,
            grid_model: None,
            observations: None,
        }
    }
}

/// Vector-tile source holding administrative-unit polygons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorTileSource {
    pub url: String,
    pub source_layer: String,
    /// Feature property holding the unit code the payload values are keyed by.
    pub code_property: String,
}

/// Daily per-unit model output rendered as a vector-tile choropleth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityModel {
    pub base_url: String,
    /// File name with placeholders, e.g. `vri_{date}.json`.
    pub file_pattern: String,
    pub max_value: f64,
    pub tiles: VectorTileSource,
    /// Zero-pad numeric unit codes to this width (e.g. 5 for "08019").
    #[serde(default)]
    pub code_width: Option<usize>,
    #[serde(default)]
    pub validity: Validity,
}

impl MunicipalityModel {
    #[inline]
    pub fn url_for(&self, day: NaiveDate) -> String {
        join_url(&self.base_url, &expand_pattern(&self.file_pattern, day))
    }

    /// Normalize a unit code from a payload to the form used by the tiles.
    pub fn normalize_code(&self, code: &str) -> String {
        let code = code.trim();
        match self.code_width {
            Some(width) if code.len() < width && code.bytes().all(|b| b.is_ascii_digit()) => {
                format!("{code:0>width$}")
            }
            _ => code.to_string(),
        }
    }
}

/// Daily high-resolution raster model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridModel {
    pub base_url: String,
    /// Candidate file names, tried in order for each day.
    pub file_patterns: Vec<String>,
    pub max_value: f64,
    #[serde(default)]
    pub validity: Validity,
}

impl GridModel {
    /// Candidate URLs for `day`, highest priority first.
    pub fn candidate_urls(&self, day: NaiveDate) -> Vec<String> {
        self.file_patterns.iter()
            .map(|pattern| join_url(&self.base_url, &expand_pattern(pattern, day)))
            .collect()
    }
}

fn default_date_columns() -> Vec<String> {
    ["date", "eventDate", "observed_on", "creation_date", "fecha"].map(String::from).to_vec()
}

fn default_category_columns() -> Vec<String> {
    ["species", "scientificName", "category", "taxon", "especie"].map(String::from).to_vec()
}

/// Citizen-science observations (CSV or GeoJSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSource {
    pub url: String,
    #[serde(default = "default_date_columns")]
    pub date_columns: Vec<String>,
    #[serde(default = "default_category_columns")]
    pub category_columns: Vec<String>,
}

impl ObservationSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            date_columns: default_date_columns(),
            category_columns: default_category_columns(),
        }
    }

    /// GeoJSON sources are recognized by extension; everything else is read as CSV.
    pub fn is_geojson(&self) -> bool {
        let path = self.url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
        path.ends_with(".geojson") || path.ends_with(".json")
    }
}

/// Substitute date placeholders in a file-name pattern.
///
/// Supported: `{date}` (YYYY-MM-DD), `{yyyymmdd}`, `{year}`, `{month}`, `{day}`.
/// Unknown placeholders are left untouched.
pub fn expand_pattern(pattern: &str, day: NaiveDate) -> String {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").ok()) else {
        return pattern.to_string();
    };

    let out: Cow<'_, str> = re.replace_all(pattern, |caps: &Captures| match &caps[1] {
        "date" => day.format("%Y-%m-%d").to_string(),
        "yyyymmdd" => compact_date(day),
        "year" => format!("{:04}", day.year()),
        "month" => format!("{:02}", day.month()),
        "day" => format!("{:02}", day.day()),
        _ => caps[0].to_string(),
    });
    out.into_owned()
}

/// Join a base URL and a relative file name with exactly one slash.
pub(crate) fn join_url(base: &str, file: &str) -> String {
    if base.is_empty() { return file.to_string() }
    format!("{}/{}", base.trim_end_matches('/'), file.trim_start_matches('/'))
}
