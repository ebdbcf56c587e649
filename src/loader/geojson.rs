use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};

/// Read a FeatureCollection from GeoJSON bytes.
///
/// A bare Feature is wrapped into a one-feature collection; any other document is an error.
pub(crate) fn read_from_geojson_bytes(bytes: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(bytes).context("Failed to parse GeoJSON bytes")?;
    match value["type"].as_str() {
        Some("FeatureCollection") if value["features"].is_array() => Ok(value),
        Some("FeatureCollection") => bail!("FeatureCollection has no features array"),
        Some("Feature") => Ok(json!({ "type": "FeatureCollection", "features": [value] })),
        other => bail!("Expected a FeatureCollection, found type {other:?}"),
    }
}

/// Features of a collection; empty for anything else.
pub(crate) fn features(collection: &Value) -> impl Iterator<Item = &Value> {
    collection["features"].as_array().into_iter().flatten()
}

/// Properties object of a feature, if any.
#[inline]
pub(crate) fn properties(feature: &Value) -> Option<&Map<String, Value>> {
    feature["properties"].as_object()
}

/// `(lon, lat)` of a Point feature. Non-finite coordinates are rejected.
pub(crate) fn point_coords(feature: &Value) -> Option<(f64, f64)> {
    let geometry = &feature["geometry"];
    if geometry["type"].as_str() != Some("Point") { return None }
    let coords = geometry["coordinates"].as_array()?;
    let lon = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
}
