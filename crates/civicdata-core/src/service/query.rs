//! Per-dataset query filters.
//!
//! Filters run on canonical records after the cache, so a query written as
//! `台北市`, `Taipei` or `臺北市` matches the same stations.

use crate::normalize::{canonical_region, CanonicalRecord};
use serde::{Deserialize, Serialize};

/// A filter over canonical records.
pub trait RecordFilter: Send + Sync {
    fn matches(&self, record: &CanonicalRecord) -> bool;

    /// Upper bound on returned records.
    fn limit(&self) -> Option<usize> {
        None
    }

    fn apply(&self, records: &[CanonicalRecord]) -> Vec<CanonicalRecord> {
        let matching = records.iter().filter(|r| self.matches(r)).cloned();
        match self.limit() {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }
}

fn field<'a>(record: &'a CanonicalRecord, key: &str) -> Option<&'a str> {
    record.get(key).and_then(|v| v.as_str())
}

fn region_matches(record: &CanonicalRecord, wanted: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => field(record, "region") == Some(canonical_region(wanted).as_str()),
    }
}

/// Exact match on `id_key`, or case-insensitive substring match on any of `name_keys`.
fn named(record: &CanonicalRecord, wanted: Option<&str>, id_key: &str, name_keys: &[&str]) -> bool {
    let Some(wanted) = wanted.map(str::trim).filter(|w| !w.is_empty()) else {
        return true;
    };
    if field(record, id_key) == Some(wanted) {
        return true;
    }
    let needle = wanted.to_lowercase();
    name_keys
        .iter()
        .filter_map(|key| field(record, key))
        .any(|value| value.to_lowercase().contains(&needle))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherQuery {
    pub region: Option<String>,
    /// Station id or part of its name.
    pub station: Option<String>,
}

impl RecordFilter for WeatherQuery {
    fn matches(&self, record: &CanonicalRecord) -> bool {
        region_matches(record, self.region.as_deref())
            && named(record, self.station.as_deref(), "station_id", &["station_name"])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservoirQuery {
    pub name: Option<String>,
}

impl RecordFilter for ReservoirQuery {
    fn matches(&self, record: &CanonicalRecord) -> bool {
        named(record, self.name.as_deref(), "reservoir_id", &["reservoir_name"])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirQualityQuery {
    pub region: Option<String>,
    pub site: Option<String>,
}

impl RecordFilter for AirQualityQuery {
    fn matches(&self, record: &CanonicalRecord) -> bool {
        region_matches(record, self.region.as_deref())
            && named(record, self.site.as_deref(), "site_id", &["site_name"])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraQuery {
    pub region: Option<String>,
    /// Matched against camera name, road and id.
    pub keyword: Option<String>,
    pub limit: Option<usize>,
}

impl RecordFilter for CameraQuery {
    fn matches(&self, record: &CanonicalRecord) -> bool {
        region_matches(record, self.region.as_deref())
            && named(record, self.keyword.as_deref(), "camera_id", &["name", "road", "camera_id"])
    }

    fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// Matches everything.
pub(crate) struct All;

impl RecordFilter for All {
    fn matches(&self, _: &CanonicalRecord) -> bool {
        true
    }
}
