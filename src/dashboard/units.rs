use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    common::{CODE_FIELDS, NAME_FIELDS, VALUE_FIELDS, number_field, text_field},
    region::MunicipalityModel,
};

/// One unit's value in one day's payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UnitValue {
    pub code: String,
    pub name: Option<String>,
    pub value: f64,
}

/// An administrative unit's mean value over the days it appeared in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitAggregate {
    pub code: String,
    pub name: Option<String>,
    pub value: f64,
    /// Number of days that contributed.
    pub days: usize,
}

/// Records of a per-unit payload: a plain array, `{"data": [...]}`, or a FeatureCollection.
fn records(doc: &Value) -> Vec<&Map<String, Value>> {
    let items = match doc {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => {
            if let Some(features) = obj.get("features").and_then(Value::as_array) {
                return features.iter().filter_map(|f| f.get("properties")?.as_object()).collect();
            }
            obj.get("data").and_then(Value::as_array).map_or(&[][..], Vec::as_slice)
        }
        _ => &[],
    };
    items.iter().filter_map(Value::as_object).collect()
}

/// Unit values in one day's payload, with codes normalized for the tile source.
///
/// Records missing a code, or whose value the model's validity rule rejects, are skipped.
/// A bare `{code: value}` object is accepted too.
pub(crate) fn unit_values(doc: &Value, model: &MunicipalityModel) -> Vec<UnitValue> {
    let valid = |v: &f64| model.validity.accepts(*v, None);
    let recs = records(doc);
    if recs.is_empty() {
        if let Some(obj) = doc.as_object() {
            return obj.iter()
                .filter(|(key, _)| !matches!(key.as_str(), "data" | "features" | "type"))
                .filter_map(|(code, v)| {
                    let value = v.as_f64().filter(valid)?;
                    Some(UnitValue { code: model.normalize_code(code), name: None, value })
                })
                .collect();
        }
    }

    recs.into_iter()
        .filter_map(|record| {
            let code = text_field(record, CODE_FIELDS)?;
            let value = number_field(record, VALUE_FIELDS).filter(valid)?;
            Some(UnitValue { code: model.normalize_code(&code), name: text_field(record, NAME_FIELDS), value })
        })
        .collect()
}

/// Mean value per unit across days. A unit only counts the days it appears in.
pub(crate) fn aggregate_units(days: &[Vec<UnitValue>]) -> Vec<UnitAggregate> {
    let mut acc: BTreeMap<&str, (Option<&str>, f64, usize)> = BTreeMap::new();
    for day in days {
        for unit in day {
            let entry = acc.entry(unit.code.as_str()).or_insert((None, 0.0, 0));
            if entry.0.is_none() { entry.0 = unit.name.as_deref() }
            entry.1 += unit.value;
            entry.2 += 1;
        }
    }
    acc.into_iter()
        .map(|(code, (name, sum, count))| UnitAggregate {
            code: code.to_string(),
            name: name.map(str::to_string),
            value: sum / count as f64,
            days: count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{raster::Validity, region::VectorTileSource};
    use serde_json::json;

    fn model() -> MunicipalityModel {
        MunicipalityModel {
            base_url: "https://m.test".into(),
            file_pattern: "{date}.json".into(),
            max_value: 1.0,
            tiles: VectorTileSource { url: "t".into(), source_layer: "l".into(), code_property: "code".into() },
            code_width: Some(5),
            validity: Default::default(),
        }
    }

    #[test]
    fn mean_counts_only_days_present() {
        let day1 = unit_values(&json!([{ "code": "08019", "vri": 0.10 }, { "code": "28079", "vri": 0.5 }]), &model());
        let day2 = unit_values(&json!([{ "natcode": 8019, "risk": 0.20 }]), &model());
        let units = aggregate_units(&[day1, day2]);

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].code, "08019");
        assert!((units[0].value - 0.15).abs() < 1e-12);
        assert_eq!(units[0].days, 2);
        assert_eq!(units[1].value, 0.5);
        assert_eq!(units[1].days, 1);
    }

    #[test]
    fn no_prediction_days_do_not_count() {
        let day1 = unit_values(&json!([{ "code": "1", "vri": 0.0 }]), &model());
        let day2 = unit_values(&json!([{ "code": "1", "vri": 0.6 }]), &model());
        assert!(day1.is_empty());

        let units = aggregate_units(&[day1, day2]);
        assert_eq!(units[0].value, 0.6);
        assert_eq!(units[0].days, 1);

        let lenient = MunicipalityModel { validity: Validity::NonNegative, ..model() };
        assert_eq!(unit_values(&json!([{ "code": "1", "vri": 0.0 }]), &lenient).len(), 1);
    }

    #[test]
    fn payload_shapes() {
        let wrapped = json!({ "data": [{ "code": "1", "name": "A", "value": "0.3" }] });
        let parsed = unit_values(&wrapped, &model());
        assert_eq!(parsed, vec![UnitValue { code: "00001".into(), name: Some("A".into()), value: 0.3 }]);

        let fc = json!({ "type": "FeatureCollection", "features": [{ "properties": { "id": "2", "vri": 0.4 } }] });
        assert_eq!(unit_values(&fc, &model())[0].code, "00002");

        let bare = json!({ "08019": 0.7, "bad": "x" });
        assert_eq!(unit_values(&bare, &model()).len(), 1);
    }

    #[test]
    fn records_without_code_or_value_are_skipped() {
        let doc = json!([{ "vri": 0.1 }, { "code": "3" }, { "code": "4", "vri": null }]);
        assert!(unit_values(&doc, &model()).is_empty());
    }
}
