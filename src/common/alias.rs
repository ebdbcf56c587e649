//! Field-name alias resolution.
//!
//! Upstream producers name the same concept differently. Each logical field has an ordered
//! candidate list; the first candidate that is present (non-null, non-empty) wins.

use polars::prelude::{DataFrame, DataType, StringChunked};
use serde_json::{Map, Value};

/// Period label candidates for time-series records.
pub(crate) const LABEL_FIELDS: &[&str] = &["date", "week", "period", "month", "label", "year"];

/// Risk value candidates, highest priority first.
pub(crate) const VALUE_FIELDS: &[&str] = &["risk_level", "vri", "risk", "value", "ma_prob_mean", "ma_prob_max"];

/// Administrative-unit code candidates.
pub(crate) const CODE_FIELDS: &[&str] = &["code", "natcode", "ine_code", "cod_ine", "municipality_code", "id"];

/// Administrative-unit display-name candidates.
pub(crate) const NAME_FIELDS: &[&str] = &["name", "nombre", "municipality", "nameunit", "district"];

pub(crate) const LONGITUDE_FIELDS: &[&str] = &["lon", "longitude", "lng", "decimalLongitude", "x"];
pub(crate) const LATITUDE_FIELDS: &[&str] = &["lat", "latitude", "decimalLatitude", "y"];

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// First alias present in `record`, with the key that matched.
pub(crate) fn first_present<'a, 'b, S: AsRef<str>>(
    record: &'a Map<String, Value>,
    aliases: &'b [S],
) -> Option<(&'b str, &'a Value)> {
    for alias in aliases {
        let alias: &str = alias.as_ref();
        if let Some(value) = record.get(alias).filter(|v| is_present(v)) {
            return Some((alias, value));
        }
    }
    None
}

/// Numeric value of the winning alias. Finite numeric strings are accepted.
pub(crate) fn number_field<S: AsRef<str>>(record: &Map<String, Value>, aliases: &[S]) -> Option<f64> {
    match first_present(record, aliases)?.1 {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Text value of the winning alias. Numbers are rendered without a trailing `.0`.
pub(crate) fn text_field<S: AsRef<str>>(record: &Map<String, Value>, aliases: &[S]) -> Option<String> {
    match first_present(record, aliases)?.1 {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.as_i64().map(|i| i.to_string()).unwrap_or_else(|| n.to_string())),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A DataFrame column read as strings, whatever dtype polars inferred.
pub(crate) fn string_column(df: &DataFrame, name: &str) -> Option<StringChunked> {
    let column = df.column(name).ok()?;
    let cast = column.cast(&DataType::String).ok()?;
    cast.str().ok().cloned()
}

/// Alias-ordered string columns of `df`; aliases with no matching column are dropped.
pub(crate) fn alias_columns<S: AsRef<str>>(df: &DataFrame, aliases: &[S]) -> Vec<StringChunked> {
    aliases.iter().filter_map(|alias| string_column(df, alias.as_ref())).collect()
}

/// Row-level resolution over alias-ordered columns: the first non-empty cell wins.
pub(crate) fn cell<'a>(columns: &'a [StringChunked], row: usize) -> Option<&'a str> {
    columns.iter()
        .filter_map(|col| col.get(row))
        .map(str::trim)
        .find(|s| !s.is_empty())
}
