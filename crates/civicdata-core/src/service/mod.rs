//! Dataset service facade.
//!
//! Wires endpoint resolution, decoding and normalization behind the TTL cache.
//! Callers get canonical records plus enough metadata to tell fresh, stale and
//! unavailable apart.

mod builder;
mod query;
mod scheduler;

pub use builder::DatasetServiceBuilder;
pub use query::{AirQualityQuery, CameraQuery, RecordFilter, ReservoirQuery, WeatherQuery};
pub use scheduler::RefreshScheduler;

use crate::cache::{CacheStatus, CachedValue, TtlCache};
use crate::cancel::CancellationToken;
use crate::datasets::{DatasetKind, ResolvedDataset};
use crate::decode::decode;
use crate::error::{CivicDataError, Result};
use crate::network::RetryCoordinator;
use crate::normalize::{normalize, CanonicalRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

type RecordSet = Arc<Vec<CanonicalRecord>>;

/// Whether a response reflects the latest refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Records returned by a dataset operation.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetResponse {
    pub dataset: DatasetKind,
    pub records: Vec<CanonicalRecord>,
    pub served_from_cache: bool,
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
    pub age: Duration,
}

impl DatasetResponse {
    fn from_cached(dataset: DatasetKind, cached: CachedValue<RecordSet>, filter: &dyn RecordFilter) -> Self {
        Self {
            dataset,
            records: filter.apply(&cached.value),
            served_from_cache: cached.served_from_cache,
            stale: cached.stale,
            fetched_at: cached.fetched_at,
            age: cached.age,
        }
    }

    pub fn state(&self) -> Freshness {
        if self.stale {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

struct ServiceInner {
    datasets: HashMap<DatasetKind, ResolvedDataset>,
    coordinator: Arc<RetryCoordinator>,
    cache: TtlCache<RecordSet>,
    shutdown: CancellationToken,
}

/// Entry point for all dataset operations. Cheap to clone.
#[derive(Clone)]
pub struct DatasetService {
    inner: Arc<ServiceInner>,
}

impl DatasetService {
    pub fn builder() -> DatasetServiceBuilder {
        DatasetServiceBuilder::new()
    }

    pub(crate) fn from_parts(
        datasets: HashMap<DatasetKind, ResolvedDataset>,
        coordinator: RetryCoordinator,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                datasets,
                coordinator: Arc::new(coordinator),
                cache: TtlCache::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn dataset(&self, kind: DatasetKind) -> Result<&ResolvedDataset> {
        self.inner.datasets.get(&kind).ok_or_else(|| CivicDataError::Config {
            message: format!("dataset {} is not configured", kind),
        })
    }

    /// The fetch → decode → normalize cycle run on a cache miss.
    fn refresher(
        &self,
        kind: DatasetKind,
    ) -> Result<impl FnOnce() -> futures::future::BoxFuture<'static, Result<RecordSet>>> {
        let dataset = self.dataset(kind)?.clone();
        let coordinator = Arc::clone(&self.inner.coordinator);
        Ok(move || -> futures::future::BoxFuture<'static, Result<RecordSet>> {
            Box::pin(async move {
                let (records, stats) = coordinator
                    .resolve_with(&dataset.endpoints, &dataset.retry, |payload| {
                        let tree = decode(&payload.bytes, dataset.format)?;
                        normalize(&tree, &dataset.rules)
                            .map_err(|source| CivicDataError::Normalize { dataset: kind, source })
                    })
                    .await?;
                debug!(
                    "{}: {} records from endpoint {:?} after {} attempts ({} skipped, {:?} backoff)",
                    kind,
                    records.len(),
                    stats.endpoint_index,
                    stats.attempts,
                    stats.skipped,
                    stats.total_delay
                );
                Ok(Arc::new(records))
            })
        })
    }

    async fn cached(&self, kind: DatasetKind) -> Result<CachedValue<RecordSet>> {
        let ttl = self.dataset(kind)?.ttl;
        let refresh = self.refresher(kind)?;
        self.inner.cache.get_or_refresh(kind, ttl, refresh).await
    }

    async fn query(&self, kind: DatasetKind, filter: &dyn RecordFilter) -> Result<DatasetResponse> {
        let cached = self.cached(kind).await?;
        Ok(DatasetResponse::from_cached(kind, cached, filter))
    }

    pub async fn current_weather(&self, query: &WeatherQuery) -> Result<DatasetResponse> {
        self.query(DatasetKind::Weather, query).await
    }

    pub async fn reservoir_levels(&self, query: &ReservoirQuery) -> Result<DatasetResponse> {
        self.query(DatasetKind::Reservoir, query).await
    }

    pub async fn air_quality(&self, query: &AirQualityQuery) -> Result<DatasetResponse> {
        self.query(DatasetKind::AirQuality, query).await
    }

    /// Latest radar frame. The response carries exactly one record.
    pub async fn radar_image(&self) -> Result<DatasetResponse> {
        let mut response = self.query(DatasetKind::Radar, &query::All).await?;
        response.records.truncate(1);
        Ok(response)
    }

    pub async fn camera_feeds(&self, query: &CameraQuery) -> Result<DatasetResponse> {
        self.query(DatasetKind::Cameras, query).await
    }

    /// All records of a dataset, unfiltered.
    pub async fn records(&self, kind: DatasetKind) -> Result<DatasetResponse> {
        self.query(kind, &query::All).await
    }

    /// Refresh now regardless of age. Falls back to the cached value on failure.
    pub async fn refresh(&self, kind: DatasetKind) -> Result<DatasetResponse> {
        let refresh = self.refresher(kind)?;
        let cached = self.inner.cache.refresh(kind, refresh).await?;
        Ok(DatasetResponse::from_cached(kind, cached, &query::All))
    }

    /// Force the next access to `kind` to refresh.
    pub fn invalidate(&self, kind: DatasetKind) {
        self.inner.cache.invalidate(kind);
    }

    pub fn cache_status(&self, kind: DatasetKind) -> Result<CacheStatus> {
        let ttl = self.dataset(kind)?.ttl;
        Ok(self.inner.cache.status(kind, ttl))
    }

    /// Datasets this service can serve.
    pub fn datasets(&self) -> impl Iterator<Item = DatasetKind> + '_ {
        DatasetKind::ALL
            .into_iter()
            .filter(|kind| self.inner.datasets.contains_key(kind))
    }

    /// Stop every scheduler started on this service and drop cached data.
    pub fn shutdown(&self) {
        info!("Shutting down dataset service");
        self.inner.shutdown.cancel();
        self.inner.cache.clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetConfig, EndpointSpec, ServiceConfig};
    use crate::error::FetchError;
    use crate::network::ScriptedFetcher;
    use serde_json::json;

    const PRIMARY: &str = "https://primary.example/stations";
    const MIRROR: &str = "https://mirror.example/stations.xml";

    const STATIONS_JSON: &str = r#"{"records": {"Station": [
        {"StationId": "466920", "StationName": "臺北", "GeoInfo": {"CountyName": "臺北市"},
         "WeatherElement": {"AirTemperature": 26.0}},
        {"StationId": "467440", "StationName": "高雄", "GeoInfo": {"CountyName": "高雄市"},
         "WeatherElement": {"AirTemperature": 29.5}}
    ]}}"#;

    const STATIONS_XML: &str = r#"<cwaopendata><dataset>
        <Station><StationId>466920</StationId><StationName>臺北</StationName>
            <GeoInfo><CountyName>台北市</CountyName></GeoInfo>
            <WeatherElement><AirTemperature>26.0</AirTemperature></WeatherElement></Station>
        <Station><StationId>467440</StationId><StationName>高雄</StationName>
            <GeoInfo><CountyName>高雄市</CountyName></GeoInfo>
            <WeatherElement><AirTemperature>29.5</AirTemperature></WeatherElement></Station>
    </dataset></cwaopendata>"#;

    fn weather_config(ttl_seconds: u64) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.datasets.insert(
            DatasetKind::Weather,
            DatasetConfig {
                ttl_seconds: Some(ttl_seconds),
                max_retries: Some(2),
                base_delay_ms: Some(1),
                endpoints: vec![EndpointSpec::new(PRIMARY), EndpointSpec::new(MIRROR)],
                ..Default::default()
            },
        );
        config
    }

    fn service(fetcher: &Arc<ScriptedFetcher>, config: ServiceConfig) -> DatasetService {
        DatasetService::builder()
            .config(config)
            .fetcher(fetcher.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_filtered_weather_within_ttl_hits_network_once() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.always(PRIMARY, Ok(STATIONS_JSON));
        let service = service(&fetcher, weather_config(600));

        let first = service
            .current_weather(&WeatherQuery {
                region: Some("台北".into()),
                station: None,
            })
            .await
            .unwrap();
        let second = service.current_weather(&WeatherQuery::default()).await.unwrap();

        assert_eq!(first.records.len(), 1);
        assert_eq!(first.records[0]["temperature"], json!(26));
        assert!(!first.served_from_cache);
        assert_eq!(second.records.len(), 2);
        assert!(second.served_from_cache);
        assert_eq!(second.state(), Freshness::Fresh);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawned_callers_share_one_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.always(PRIMARY, Ok(STATIONS_JSON));
        let service = service(&fetcher, weather_config(600));

        let handles: Vec<_> = ["台北市", "高雄"]
            .into_iter()
            .map(|region| {
                let service = service.clone();
                let query = WeatherQuery {
                    region: Some(region.into()),
                    station: None,
                };
                tokio::spawn(async move { service.current_weather(&query).await })
            })
            .collect();

        for handle in handles {
            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.records.len(), 1);
        }
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failover_to_xml_mirror_yields_same_records() {
        let json_only = Arc::new(ScriptedFetcher::default());
        json_only.always(PRIMARY, Ok(STATIONS_JSON));
        let expected = service(&json_only, weather_config(600))
            .current_weather(&WeatherQuery::default())
            .await
            .unwrap();

        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.always(PRIMARY, Err(FetchError::http(PRIMARY, 503)));
        fetcher.always(MIRROR, Ok(STATIONS_XML));
        let response = service(&fetcher, weather_config(600))
            .current_weather(&WeatherQuery::default())
            .await
            .unwrap();

        assert_eq!(response.records, expected.records);
        assert_eq!(fetcher.calls(), vec![PRIMARY, PRIMARY, MIRROR]);
    }

    #[tokio::test]
    async fn test_stale_then_unavailable() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push(PRIMARY, Ok(STATIONS_JSON));
        let service = service(&fetcher, weather_config(0));

        service.current_weather(&WeatherQuery::default()).await.unwrap();
        let stale = service.current_weather(&WeatherQuery::default()).await.unwrap();
        assert!(stale.stale);
        assert_eq!(stale.state(), Freshness::Stale);
        assert_eq!(stale.records.len(), 2);

        service.shutdown();
        assert!(service.is_shut_down());
        let err = service
            .current_weather(&WeatherQuery::default())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_garbage_body_fails_over() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.always(PRIMARY, Ok("<html><body>maintenance</body></html>"));
        fetcher.always(MIRROR, Ok(STATIONS_XML));
        let service = service(&fetcher, weather_config(600));

        let response = service.current_weather(&WeatherQuery::default()).await.unwrap();
        assert_eq!(response.records.len(), 2);
        // Well-formed markup of the wrong shape is not worth retrying.
        assert_eq!(fetcher.calls(), vec![PRIMARY, MIRROR]);
    }

    #[tokio::test]
    async fn test_forced_refresh_and_status() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.always(PRIMARY, Ok(STATIONS_JSON));
        let service = service(&fetcher, weather_config(600));

        assert!(!service.cache_status(DatasetKind::Weather).unwrap().has_entry);
        service.current_weather(&WeatherQuery::default()).await.unwrap();
        let refreshed = service.refresh(DatasetKind::Weather).await.unwrap();

        assert!(!refreshed.served_from_cache);
        assert_eq!(fetcher.calls().len(), 2);
        let status = service.cache_status(DatasetKind::Weather).unwrap();
        assert!(status.has_entry && status.fresh);
    }

    #[tokio::test]
    async fn test_radar_returns_single_record() {
        let url = "https://radar.example/latest.json";
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.always(
            url,
            Ok(r#"{"cwaopendata": {"dataset": {"DateTime": "2024-05-01T10:00:00+08:00",
                "resource": {"ProductURL": "https://img.example/radar.png"}}}}"#),
        );
        let mut config = ServiceConfig::default();
        config.datasets.insert(
            DatasetKind::Radar,
            DatasetConfig {
                endpoints: vec![EndpointSpec::new(url)],
                ..Default::default()
            },
        );

        let response = service(&fetcher, config).radar_image().await.unwrap();
        assert_eq!(response.records.len(), 1);
        assert!(response.records[0]["image_url"]
            .as_str()
            .unwrap()
            .starts_with("https://img.example/radar.png?_t="));
    }
}
