use anyhow::Result;
use chrono::{Months, NaiveDate};
use polars::{df, frame::DataFrame};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::{Value, json};

/// Number of monthly points in the synthetic series.
pub(crate) const FALLBACK_POINTS: usize = 12;

/// First day of the synthetic series.
pub(crate) const FALLBACK_START: NaiveDate = match NaiveDate::from_ymd_opt(2023, 1, 1) {
    Some(day) => day,
    None => panic!("invalid fallback start"),
};

const FALLBACK_SEED: u64 = 0x5652_4931;

/// Synthetic monthly series shown when a tabular source cannot be loaded.
///
/// Columns match the usual upstream export (`date`, `risk_level`, `temperature`,
/// `precipitation`, `humidity`), all as strings like a parsed CSV. The generator is seeded,
/// so every call yields the same frame.
pub(crate) fn synthetic_series() -> Result<DataFrame> {
    let mut rng = StdRng::seed_from_u64(FALLBACK_SEED);

    let mut dates = Vec::with_capacity(FALLBACK_POINTS);
    let mut risk = Vec::with_capacity(FALLBACK_POINTS);
    let mut temperature = Vec::with_capacity(FALLBACK_POINTS);
    let mut precipitation = Vec::with_capacity(FALLBACK_POINTS);
    let mut humidity = Vec::with_capacity(FALLBACK_POINTS);

    for month in 0..FALLBACK_POINTS as u32 {
        let day = FALLBACK_START.checked_add_months(Months::new(month)).unwrap_or(FALLBACK_START);
        dates.push(day.format("%Y-%m-%d").to_string());
        risk.push(format!("{:.3}", rng.random_range(0.05..0.95)));
        temperature.push(format!("{:.1}", rng.random_range(8.0..30.0)));
        precipitation.push(format!("{:.1}", rng.random_range(0.0..120.0)));
        humidity.push(format!("{:.1}", rng.random_range(40.0..90.0)));
    }

    Ok(df![
        "date" => dates,
        "risk_level" => risk,
        "temperature" => temperature,
        "precipitation" => precipitation,
        "humidity" => humidity,
    ]?)
}

/// Two-point sample collection shown when a vector source cannot be loaded.
pub(crate) fn sample_collection() -> Value {
    let point = |lon: f64, lat: f64, name: &str, value: f64| json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [lon, lat] },
        "properties": { "name": name, "value": value, "sample": true },
    });
    json!({
        "type": "FeatureCollection",
        "features": [
            point(2.1734, 41.3851, "Sample A", 0.3),
            point(-3.7038, 40.4168, "Sample B", 0.6),
        ],
    })
}
