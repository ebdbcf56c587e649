use anyhow::{Context, Result};
use chrono::NaiveDate;
use geo::Point;
use polars::{frame::DataFrame, prelude::StringChunked};
use serde_json::Value;
use tracing::debug;

use crate::{
    common::{LATITUDE_FIELDS, LONGITUDE_FIELDS, alias_columns, cell, parse_loose_date, text_field},
    loader::{DataLoader, Fetcher, features, point_coords, properties},
    region::ObservationSource,
};

fn coord(columns: &[StringChunked], row: usize) -> Option<f64> {
    cell(columns, row).and_then(|s| s.parse::<f64>().ok())
}

/// A citizen-science sighting. Coordinates are always finite.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationPoint {
    /// `x` is longitude, `y` is latitude.
    pub position: Point<f64>,
    pub category: Option<String>,
    pub date: Option<NaiveDate>,
}

impl ObservationPoint {
    /// Point with finite coordinates, or `None`.
    pub fn new(lon: f64, lat: f64, category: Option<String>, date: Option<NaiveDate>) -> Option<Self> {
        (lon.is_finite() && lat.is_finite()).then(|| Self { position: Point::new(lon, lat), category, date })
    }

    #[inline] pub fn lon(&self) -> f64 { self.position.x() }
    #[inline] pub fn lat(&self) -> f64 { self.position.y() }

    /// Points from CSV rows. Rows with a missing or non-finite coordinate are dropped.
    pub fn from_frame(df: &DataFrame, source: &ObservationSource) -> Vec<Self> {
        let lons = alias_columns(df, LONGITUDE_FIELDS);
        let lats = alias_columns(df, LATITUDE_FIELDS);
        let dates = alias_columns(df, source.date_columns.as_slice());
        let categories = alias_columns(df, source.category_columns.as_slice());

        (0..df.height())
            .filter_map(|row| {
                Self::new(
                    coord(&lons, row)?,
                    coord(&lats, row)?,
                    cell(&categories, row).map(str::to_string),
                    cell(&dates, row).and_then(parse_loose_date),
                )
            })
            .collect()
    }

    /// Points from GeoJSON `Point` features; other geometries are dropped.
    pub fn from_geojson(collection: &Value, source: &ObservationSource) -> Vec<Self> {
        features(collection)
            .filter_map(|feature| {
                let (lon, lat) = point_coords(feature)?;
                let props = properties(feature);
                let category = props.and_then(|p| text_field(p, source.category_columns.as_slice()));
                let date = props
                    .and_then(|p| text_field(p, source.date_columns.as_slice()))
                    .and_then(|s| parse_loose_date(&s));
                Self::new(lon, lat, category, date)
            })
            .collect()
    }

    /// Fetch and ingest every point of `source`.
    pub async fn load<F: Fetcher>(loader: &DataLoader<F>, source: &ObservationSource) -> Result<Vec<Self>> {
        let points = if source.is_geojson() {
            let doc = loader.load_json(&source.url).await?;
            Self::from_geojson(&doc, source)
        } else {
            let tabular = loader.try_load_tabular(&source.url).await
                .with_context(|| format!("Failed to load observations from {}", source.url))?;
            Self::from_frame(&tabular.frame, source)
        };
        debug!("Ingested {} observation points from {}", points.len(), source.url);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::read_from_csv_bytes;
    use serde_json::json;

    #[test]
    fn csv_rows_without_finite_coordinates_are_dropped() {
        let csv = "longitude,latitude,species,eventDate\n\
                   2.17,41.38,Aedes albopictus,2024-06-15\n\
                   NaN,41.0,Aedes albopictus,2024-06-15\n\
                   ,41.0,Aedes albopictus,2024-06-15\n\
                   2.0,inf,Aedes albopictus,2024-06-15\n\
                   2.5,41.5,,15/06/2024\n";
        let df = read_from_csv_bytes(csv.as_bytes()).unwrap();
        let points = ObservationPoint::from_frame(&df, &ObservationSource::new("obs.csv"));

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].category.as_deref(), Some("Aedes albopictus"));
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 6, 15));
        assert_eq!(points[1].category, None);
        assert_eq!(points[1].date, NaiveDate::from_ymd_opt(2024, 6, 15));
    }

    #[test]
    fn geojson_points_read_properties() {
        let fc = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature",
                  "geometry": { "type": "Point", "coordinates": [-3.7, 40.4] },
                  "properties": { "scientificName": "Aedes aegypti", "observed_on": "2024-05-02T10:00:00Z" } },
                { "type": "Feature",
                  "geometry": { "type": "Polygon", "coordinates": [] },
                  "properties": {} },
            ]
        });
        let points = ObservationPoint::from_geojson(&fc, &ObservationSource::new("obs.geojson"));
        assert_eq!(points.len(), 1);
        assert_eq!((points[0].lon(), points[0].lat()), (-3.7, 40.4));
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 5, 2));
    }
}
