//! Schema normalization into canonical records.
//!
//! The same dataset arrives in several shapes (authenticated API vs anonymous
//! file download, XML vs JSON, and the occasional unannounced rename of the
//! list key). A [`RuleSet`] describes where records usually live, which fields
//! identify a record list, and how each canonical field is read.

mod region;
mod resource_url;

pub use region::{canonical_region, known_regions};
pub use resource_url::{next_stamp, resolve as resolve_url, with_cache_bust};

use crate::decode::{lookup, DecodedTree};
use crate::error::NormalizeError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::{Map, Number, Value};
use std::collections::VecDeque;
use url::Url;

/// One normalized row: canonical key to value. Every record of a dataset carries
/// the same keys; absent fields are `null`.
pub type CanonicalRecord = Map<String, Value>;

/// Maximum nesting depth searched when sniffing for a record list.
const SNIFF_MAX_DEPTH: usize = 4;

/// Providers publish naive local times in UTC+8.
const LOCAL_OFFSET_SECS: i32 = 8 * 3600;

/// Numeric placeholders providers use for "no reading".
const MISSING_SENTINELS: &[&str] = &["", "-", "--", "x", "na", "n/a", "nd", "-99", "-999", "-9999"];

/// Value transform applied after a source alias is selected.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Trim strings; empty becomes null; numbers become strings.
    Text,
    /// Parse numeric strings; sentinels become null.
    Number,
    /// Numbers on a 0–100 scale. Fractions in 0–1 are rescaled; a `%` suffix is stripped.
    Percentage,
    /// Collapse spelling variants of an administrative region.
    Region,
    /// Timestamps rendered as RFC 3339 in UTC+8; naive times are taken as local.
    Timestamp,
    /// Resolve against `base`, optionally appending a fresh cache-defeating stamp.
    ResourceUrl { base: Option<Url>, cache_bust: bool },
}

impl Transform {
    pub fn apply(&self, value: &Value) -> Value {
        match self {
            Transform::Text => text(value),
            Transform::Number => number(value),
            Transform::Percentage => percentage(value),
            Transform::Region => match text(value) {
                Value::String(s) => Value::String(canonical_region(&s)),
                other => other,
            },
            Transform::Timestamp => timestamp(value),
            Transform::ResourceUrl { base, cache_bust } => {
                let Value::String(raw) = text(value) else {
                    return Value::Null;
                };
                match resource_url::resolve(&raw, base.as_ref()) {
                    Some(url) if *cache_bust => {
                        Value::String(with_cache_bust(url, next_stamp()).into())
                    }
                    Some(url) => Value::String(url.into()),
                    None => Value::String(raw),
                }
            }
        }
    }
}

/// Declarative mapping for one canonical field.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationRule {
    pub canonical_key: String,
    /// Source keys in preference order. Dotted paths address nested fields.
    pub source_key_aliases: Vec<String>,
    pub transform: Option<Transform>,
}

impl NormalizationRule {
    pub fn new(canonical_key: &str, aliases: &[&str]) -> Self {
        Self {
            canonical_key: canonical_key.to_string(),
            source_key_aliases: aliases.iter().map(|a| a.to_string()).collect(),
            transform: None,
        }
    }

    pub fn with(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Read this field from a source record.
    ///
    /// A record that already carries the canonical key is already normalized
    /// and its value is kept untouched; this makes normalization idempotent.
    /// When the canonical key doubles as a source alias the transform is
    /// applied instead, so such rules must use an idempotent transform.
    fn extract(&self, record: &Value) -> Value {
        if !self.source_key_aliases.contains(&self.canonical_key) {
            if let Some(value) = record.get(&self.canonical_key) {
                return value.clone();
            }
        }
        let source = self
            .source_key_aliases
            .iter()
            .filter_map(|alias| lookup(record, alias))
            .find(|v| !v.is_null());
        match (source, &self.transform) {
            (Some(value), Some(transform)) => transform.apply(value),
            (Some(value), None) => value.clone(),
            (None, _) => Value::Null,
        }
    }
}

/// Everything needed to normalize one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    /// Known container paths, probed in order.
    pub container_paths: Vec<String>,
    /// Fields whose presence identifies a record list during shape-sniffing.
    pub signature_fields: Vec<String>,
    pub rules: Vec<NormalizationRule>,
}

impl RuleSet {
    pub fn new(container_paths: &[&str], signature_fields: &[&str], rules: Vec<NormalizationRule>) -> Self {
        Self {
            container_paths: container_paths.iter().map(|p| p.to_string()).collect(),
            signature_fields: signature_fields.iter().map(|f| f.to_string()).collect(),
            rules,
        }
    }

    pub fn canonical_keys(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.canonical_key.as_str())
    }

    /// Does this object look like a record of the dataset?
    ///
    /// The first rule's canonical key counts as a signature too, so records that
    /// are already canonical are recognized like any other shape.
    fn looks_like_record(&self, value: &Value) -> bool {
        if !value.is_object() {
            return false;
        }
        self.signature_fields
            .iter()
            .any(|field| lookup(value, field).is_some())
            || self
                .rules
                .first()
                .is_some_and(|rule| value.get(&rule.canonical_key).is_some())
    }

    fn find_container<'a>(&self, tree: &'a DecodedTree) -> Option<&'a [Value]> {
        for path in &self.container_paths {
            match tree.get(path) {
                Some(Value::Array(items)) if !items.is_empty() => return Some(items),
                // Single children and single-resource datasets show up as one object.
                Some(single) if single.is_object() && self.looks_like_record(single) => {
                    return Some(std::slice::from_ref(single))
                }
                _ => {}
            }
        }
        self.sniff(tree.root())
    }

    /// Breadth-first search for the first list whose first element carries a
    /// signature field.
    fn sniff<'a>(&self, root: &'a Value) -> Option<&'a [Value]> {
        let mut queue: VecDeque<(&'a Value, usize)> = VecDeque::from([(root, 0)]);
        while let Some((node, depth)) = queue.pop_front() {
            match node {
                Value::Array(items) => {
                    if items.first().is_some_and(|first| self.looks_like_record(first)) {
                        return Some(items);
                    }
                }
                Value::Object(map) if depth < SNIFF_MAX_DEPTH => {
                    queue.extend(map.values().map(|child| (child, depth + 1)));
                }
                _ => {}
            }
        }
        None
    }

    fn normalize_record(&self, record: &Value) -> CanonicalRecord {
        self.rules
            .iter()
            .map(|rule| (rule.canonical_key.clone(), rule.extract(record)))
            .collect()
    }
}

/// Normalize a decoded payload into canonical records.
///
/// Fails only when no record list can be located at all; missing fields inside
/// records become `null`.
pub fn normalize(tree: &DecodedTree, rules: &RuleSet) -> Result<Vec<CanonicalRecord>, NormalizeError> {
    let items = rules.find_container(tree).ok_or_else(|| NormalizeError {
        tried: rules.container_paths.clone(),
        signature: rules.signature_fields.clone(),
    })?;

    Ok(items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| rules.normalize_record(item))
        .collect())
}

fn text(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                Value::String(trimmed.to_string())
            }
        }
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        _ => Value::Null,
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned = s.trim().replace(',', "");
            if MISSING_SENTINELS.contains(&cleaned.to_lowercase().as_str()) {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    if !parsed.is_finite() || [-99.0, -999.0, -9999.0].contains(&parsed) {
        return None;
    }
    Some(parsed)
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn number(value: &Value) -> Value {
    parse_number(value).map(number_value).unwrap_or(Value::Null)
}

fn percentage(value: &Value) -> Value {
    let explicit_percent = matches!(value, Value::String(s) if s.trim().ends_with('%'));
    let stripped = match value {
        Value::String(s) => Value::String(s.trim().trim_end_matches('%').to_string()),
        other => other.clone(),
    };
    let Some(mut n) = parse_number(&stripped) else {
        return Value::Null;
    };
    if !explicit_percent && (0.0..=1.0).contains(&n) {
        n *= 100.0;
    }
    number_value((n * 100.0).round() / 100.0)
}

fn timestamp(value: &Value) -> Value {
    let Value::String(raw) = text(value) else {
        return Value::Null;
    };
    let Some(offset) = FixedOffset::east_opt(LOCAL_OFFSET_SECS) else {
        return Value::String(raw);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Value::String(dt.with_timezone(&offset).to_rfc3339());
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, format) {
            if let Some(local) = offset.from_local_datetime(&naive).single() {
                return Value::String(local.to_rfc3339());
            }
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        if let Some(local) = date
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| offset.from_local_datetime(&naive).single())
        {
            return Value::String(local.to_rfc3339());
        }
    }
    // Unknown formats are kept rather than dropped.
    Value::String(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn station_rules() -> RuleSet {
        RuleSet::new(
            &["records.Station", "Station"],
            &["StationName", "StationId"],
            vec![
                NormalizationRule::new("station_name", &["StationName", "stationName"])
                    .with(Transform::Text),
                NormalizationRule::new("region", &["GeoInfo.CountyName", "CountyName"])
                    .with(Transform::Region),
                NormalizationRule::new("temperature", &["WeatherElement.AirTemperature", "TEMP"])
                    .with(Transform::Number),
            ],
        )
    }

    #[test]
    fn test_nested_and_top_level_shapes_agree() {
        let nested = DecodedTree::new(json!({"records": {"Station": [
            {"StationName": "淡水", "GeoInfo": {"CountyName": "新北市"}, "WeatherElement": {"AirTemperature": 23.4}}
        ]}}));
        let flat = DecodedTree::new(json!({"Station": [
            {"stationName": " 淡水 ", "CountyName": "台北縣", "TEMP": "23.4"}
        ]}));

        let a = normalize(&nested, &station_rules()).unwrap();
        let b = normalize(&flat, &station_rules()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0]["region"], json!("新北市"));
    }

    #[test]
    fn test_shape_sniffing_matches_documented_key() {
        let documented = DecodedTree::new(json!({"Station": [{"StationName": "A", "TEMP": "20"}]}));
        let renamed = DecodedTree::new(json!({
            "success": "true",
            "result": {"fields": [{"id": "x"}]},
            "StationList_v2": [{"StationName": "A", "TEMP": "20"}]
        }));
        assert_eq!(
            normalize(&documented, &station_rules()).unwrap(),
            normalize(&renamed, &station_rules()).unwrap()
        );
    }

    #[test]
    fn test_missing_fields_keep_key_set() {
        let tree = DecodedTree::new(json!({"Station": [{"StationName": "A"}]}));
        let records = normalize(&tree, &station_rules()).unwrap();
        let keys: Vec<_> = records[0].keys().cloned().collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(records[0]["temperature"], Value::Null);
        assert_eq!(records[0]["region"], Value::Null);
    }

    #[test]
    fn test_unrecognizable_payload_fails() {
        let tree = DecodedTree::new(json!({"message": "quota exceeded", "items": [{"foo": 1}]}));
        let err = normalize(&tree, &station_rules()).unwrap_err();
        assert!(err.tried.contains(&"Station".to_string()));
    }

    #[test]
    fn test_empty_documented_list_falls_through_to_sniffing() {
        let tree = DecodedTree::new(json!({"Station": [], "data": [{"StationId": "466920"}]}));
        let records = normalize(&tree, &station_rules()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_single_object_container() {
        let tree = DecodedTree::new(json!({"records": {"Station": {"StationName": "Solo"}}}));
        let records = normalize(&tree, &station_rules()).unwrap();
        assert_eq!(records[0]["station_name"], json!("Solo"));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let rules = RuleSet::new(
            &["cams"],
            &["CCTVID"],
            vec![
                NormalizationRule::new("camera_id", &["CCTVID"]).with(Transform::Text),
                NormalizationRule::new("storage_percent", &["Percentage"]).with(Transform::Percentage),
                NormalizationRule::new("image_url", &["ImagePath"]).with(Transform::ResourceUrl {
                    base: Url::parse("https://host").ok(),
                    cache_bust: true,
                }),
            ],
        );
        let tree = DecodedTree::new(json!({"cams": [
            {"CCTVID": "C1", "Percentage": 0.005, "ImagePath": "/a.jpg"}
        ]}));

        let once = normalize(&tree, &rules).unwrap();
        let twice = normalize(&DecodedTree::new(json!({ "records": once.clone() })), &rules).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once[0]["storage_percent"], json!(0.5));
    }

    #[test]
    fn test_cache_busted_urls_change_between_calls() {
        let transform = Transform::ResourceUrl {
            base: Url::parse("https://host").ok(),
            cache_bust: true,
        };
        let first = transform.apply(&json!("/images/cam1.jpg"));
        let second = transform.apply(&json!("/images/cam1.jpg"));

        let first = first.as_str().unwrap();
        let second = second.as_str().unwrap();
        assert!(first.starts_with("https://host/images/cam1.jpg?_t="));
        assert!(second.starts_with("https://host/images/cam1.jpg?_t="));
        assert_ne!(first, second);
    }

    #[test]
    fn test_number_sentinels() {
        assert_eq!(Transform::Number.apply(&json!("-99")), Value::Null);
        assert_eq!(Transform::Number.apply(&json!(-999)), Value::Null);
        assert_eq!(Transform::Number.apply(&json!("X")), Value::Null);
        assert_eq!(Transform::Number.apply(&json!("1,234")), json!(1234));
        assert_eq!(Transform::Number.apply(&json!(" 23.5 ")), json!(23.5));
    }

    #[test]
    fn test_percentage_forms() {
        assert_eq!(Transform::Percentage.apply(&json!(0.8512)), json!(85.12));
        assert_eq!(Transform::Percentage.apply(&json!("85.3%")), json!(85.3));
        assert_eq!(Transform::Percentage.apply(&json!("0.5%")), json!(0.5));
        assert_eq!(Transform::Percentage.apply(&json!("72")), json!(72));
        assert_eq!(Transform::Percentage.apply(&json!("")), Value::Null);
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(
            Transform::Timestamp.apply(&json!("2024-05-01 10:00:00")),
            json!("2024-05-01T10:00:00+08:00")
        );
        assert_eq!(
            Transform::Timestamp.apply(&json!("2024-05-01T02:00:00Z")),
            json!("2024-05-01T10:00:00+08:00")
        );
        assert_eq!(
            Transform::Timestamp.apply(&json!("2024/05/01 10:00")),
            json!("2024-05-01T10:00:00+08:00")
        );
        assert_eq!(Transform::Timestamp.apply(&json!("yesterday")), json!("yesterday"));
    }
}
