use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use anyhow::{Context, Result};
use bytes::Bytes;
use polars::frame::DataFrame;
use serde_json::Value;
use tracing::{debug, warn};

use crate::common::lock;

use super::{
    Fetcher,
    csv::read_from_csv_bytes,
    fallback::{sample_collection, synthetic_series},
    geojson::read_from_geojson_bytes,
    gzip::decode_body,
};

/// Where a loaded dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Parsed from the fetched payload.
    Remote,
    /// Synthetic placeholder produced after a failed load.
    Fallback,
}

/// Parsed tabular payload. Every column holds strings; look fields up by header name.
#[derive(Debug, Clone)]
pub struct Tabular {
    pub frame: DataFrame,
    pub origin: Origin,
}

impl Tabular {
    #[inline] pub fn is_fallback(&self) -> bool { self.origin == Origin::Fallback }
}

/// Parsed GeoJSON FeatureCollection.
#[derive(Debug, Clone)]
pub struct VectorData {
    pub geojson: Value,
    pub origin: Origin,
}

impl VectorData {
    #[inline] pub fn is_fallback(&self) -> bool { self.origin == Origin::Fallback }
}

/// Fetching loader with a per-URL cache for each payload kind.
///
/// Only successful parses are cached, for the life of the loader. Fallbacks are rebuilt on
/// every call so that a later request can still pick up the real data.
#[derive(Debug)]
pub struct DataLoader<F> {
    fetcher: F,
    tabular: Mutex<AHashMap<String, Arc<Tabular>>>,
    vector: Mutex<AHashMap<String, Arc<VectorData>>>,
    raster: Mutex<AHashMap<String, Bytes>>,
    json: Mutex<AHashMap<String, Arc<Value>>>,
}

impl<F: Fetcher> DataLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            tabular: Mutex::default(),
            vector: Mutex::default(),
            raster: Mutex::default(),
            json: Mutex::default(),
        }
    }

    #[inline] pub fn fetcher(&self) -> &F { &self.fetcher }

    /// Fetch `url` and undo any transport compression.
    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>> {
        let payload = self.fetcher.fetch(url).await
            .with_context(|| format!("Failed to fetch {url}"))?;
        decode_body(url, &payload)
    }

    /// CSV rows at `url`. Never fails: any fetch or parse error yields the synthetic series.
    pub async fn load_tabular(&self, url: &str) -> Arc<Tabular> {
        match self.try_load_tabular(url).await {
            Ok(tabular) => tabular,
            Err(e) => {
                warn!("Using synthetic series for {url}: {e:#}");
                let frame = synthetic_series().unwrap_or_else(|_| DataFrame::empty());
                Arc::new(Tabular { frame, origin: Origin::Fallback })
            }
        }
    }

    /// CSV rows at `url`, propagating errors.
    pub async fn try_load_tabular(&self, url: &str) -> Result<Arc<Tabular>> {
        let cached = lock(&self.tabular).get(url).cloned();
        if let Some(hit) = cached {
            debug!("Cache hit (tabular) {url}");
            return Ok(hit);
        }

        let body = self.fetch_body(url).await?;
        let frame = read_from_csv_bytes(&body).with_context(|| format!("Failed to read CSV from {url}"))?;
        let tabular = Arc::new(Tabular { frame, origin: Origin::Remote });
        lock(&self.tabular).insert(url.to_string(), tabular.clone());
        Ok(tabular)
    }

    /// GeoJSON at `url`. Never fails: errors yield a two-point sample collection.
    pub async fn load_vector(&self, url: &str) -> Arc<VectorData> {
        let cached = lock(&self.vector).get(url).cloned();
        if let Some(hit) = cached {
            debug!("Cache hit (vector) {url}");
            return hit;
        }

        let parsed = match self.fetch_body(url).await {
            Ok(body) => read_from_geojson_bytes(&body).with_context(|| format!("Failed to read GeoJSON from {url}")),
            Err(e) => Err(e),
        };
        match parsed {
            Ok(geojson) => {
                let data = Arc::new(VectorData { geojson, origin: Origin::Remote });
                lock(&self.vector).insert(url.to_string(), data.clone());
                data
            }
            Err(e) => {
                warn!("Using sample features for {url}: {e:#}");
                Arc::new(VectorData { geojson: sample_collection(), origin: Origin::Fallback })
            }
        }
    }

    /// Raw raster bytes at `url` (decompressed if needed). Errors propagate.
    pub async fn load_raster_bytes(&self, url: &str) -> Result<Bytes> {
        let cached = lock(&self.raster).get(url).cloned();
        if let Some(hit) = cached {
            debug!("Cache hit (raster) {url}");
            return Ok(hit);
        }

        let bytes = Bytes::from(self.fetch_body(url).await?);
        lock(&self.raster).insert(url.to_string(), bytes.clone());
        Ok(bytes)
    }

    /// JSON document at `url`. Errors propagate.
    pub async fn load_json(&self, url: &str) -> Result<Arc<Value>> {
        let cached = lock(&self.json).get(url).cloned();
        if let Some(hit) = cached {
            debug!("Cache hit (json) {url}");
            return Ok(hit);
        }

        let body = self.fetch_body(url).await?;
        let value: Value = serde_json::from_slice(&body).with_context(|| format!("Failed to parse JSON from {url}"))?;
        let value = Arc::new(value);
        lock(&self.json).insert(url.to_string(), value.clone());
        Ok(value)
    }
}
