use std::collections::BTreeMap;

use anyhow::{Result, bail};
use polars::frame::DataFrame;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    common::{LABEL_FIELDS, VALUE_FIELDS, alias_columns, cell, first_present, number_field, string_column, text_field},
    loader::{DataLoader, Fetcher, Origin},
    region::Region,
};

/// One period of a time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    /// Date or period label, as published.
    pub label: String,
    /// Risk value from the highest-priority value alias present.
    pub value: Option<f64>,
    /// Every numeric field of the record, keyed by field name.
    pub fields: BTreeMap<String, f64>,
}

impl TimeSeriesPoint {
    /// Build a point from a JSON record. Records without a label are rejected.
    pub fn from_record(record: &Map<String, Value>) -> Option<Self> {
        let label = text_field(record, LABEL_FIELDS)?;
        let label_key = first_present(record, LABEL_FIELDS).map(|(key, _)| key);
        let fields = record.iter()
            .filter(|(key, _)| Some(key.as_str()) != label_key)
            .filter_map(|(key, value)| numeric(value).map(|v| (key.clone(), v)))
            .collect();
        Some(Self { label, value: number_field(record, VALUE_FIELDS), fields })
    }

    /// Named numeric field.
    #[inline]
    pub fn field(&self, name: &str) -> Option<f64> { self.fields.get(name).copied() }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Points from a tabular frame, one per row with a non-empty label.
pub(crate) fn points_from_frame(df: &DataFrame) -> Vec<TimeSeriesPoint> {
    let labels = alias_columns(df, LABEL_FIELDS);
    let values = alias_columns(df, VALUE_FIELDS);

    let numeric_columns: Vec<(String, Vec<Option<f64>>)> = df.get_columns().iter()
        .map(|column| column.name().to_string())
        .filter(|name| !LABEL_FIELDS.contains(&name.as_str()))
        .filter_map(|name| {
            let col = string_column(df, &name)?;
            let parsed = (&col).into_iter()
                .map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()).filter(|v| v.is_finite()))
                .collect();
            Some((name, parsed))
        })
        .collect();

    (0..df.height())
        .filter_map(|row| {
            let label = cell(&labels, row)?.to_string();
            let value = cell(&values, row).and_then(|s| s.parse::<f64>().ok()).filter(|v| v.is_finite());
            let fields = numeric_columns.iter()
                .filter_map(|(name, parsed)| parsed[row].map(|v| (name.clone(), v)))
                .collect();
            Some(TimeSeriesPoint { label, value, fields })
        })
        .collect()
}

/// Points from a JSON array of records, or an object wrapping one under `data`.
pub(crate) fn points_from_json(value: &Value) -> Vec<TimeSeriesPoint> {
    let records = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => obj.get("data").and_then(Value::as_array).map_or(&[][..], Vec::as_slice),
        _ => &[],
    };
    records.iter()
        .filter_map(Value::as_object)
        .filter_map(TimeSeriesPoint::from_record)
        .collect()
}

/// A loaded series and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub points: Vec<TimeSeriesPoint>,
    #[serde(skip)]
    pub origin: Origin,
}

impl TimeSeries {
    #[inline] pub fn len(&self) -> usize { self.points.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.points.is_empty() }

    #[inline] pub fn is_fallback(&self) -> bool { self.origin == Origin::Fallback }

    /// Region-level series.
    ///
    /// The JSON endpoint is tried first; if it fails or has no usable records the CSV endpoint
    /// is used, which falls back to the synthetic series on failure.
    pub async fn load_region<F: Fetcher>(loader: &DataLoader<F>, region: &Region) -> Result<Self> {
        let sources = &region.sources;
        if let Some(url) = &sources.timeseries_json {
            match loader.load_json(url).await {
                Ok(doc) => {
                    let points = points_from_json(&doc);
                    if !points.is_empty() {
                        debug!("Loaded {} series points for {} from {url}", points.len(), region.id);
                        return Ok(Self { points, origin: Origin::Remote });
                    }
                    warn!("{url} has no usable series records; trying CSV");
                }
                Err(e) => warn!("JSON series for {} unavailable: {e:#}", region.id),
            }
        }

        let Some(url) = &sources.timeseries_csv else {
            bail!("[TimeSeries.load_region] region {} has no time-series source", region.id);
        };
        let tabular = loader.load_tabular(url).await;
        Ok(Self { points: points_from_frame(&tabular.frame), origin: tabular.origin })
    }

    /// Series for one administrative unit, from the `{code}` subregion endpoint.
    pub async fn load_subregion<F: Fetcher>(loader: &DataLoader<F>, region: &Region, code: &str) -> Result<Self> {
        let Some(pattern) = &region.sources.subregion_series else {
            bail!("[TimeSeries.load_subregion] region {} has no subregion series", region.id);
        };
        let url = pattern.replace("{code}", code.trim());

        let path = url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
        if path.ends_with(".csv") || path.ends_with(".csv.gz") {
            let tabular = loader.load_tabular(&url).await;
            return Ok(Self { points: points_from_frame(&tabular.frame), origin: tabular.origin });
        }

        let doc = loader.load_json(&url).await?;
        Ok(Self { points: points_from_json(&doc), origin: Origin::Remote })
    }
}
