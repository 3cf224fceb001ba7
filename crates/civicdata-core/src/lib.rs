//! civicdata core - resilient acquisition of public open-data feeds.
//!
//! Fetches weather observations, reservoir levels, air quality, radar imagery
//! and traffic cameras from unreliable government endpoints, falls back across
//! mirrors, and normalizes every upstream shape into one canonical record
//! format behind a TTL cache with stale fallback.
//!
//! # Example
//!
//! ```rust,ignore
//! use civicdata_core::{DatasetService, WeatherQuery};
//!
//! #[tokio::main]
//! async fn main() -> civicdata_core::Result<()> {
//!     let service = DatasetService::builder().build()?;
//!
//!     let query = WeatherQuery { region: Some("台北市".into()), station: None };
//!     let response = service.current_weather(&query).await?;
//!     println!("{} stations, stale: {}", response.records.len(), response.stale);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod datasets;
pub mod decode;
pub mod error;
pub mod network;
pub mod normalize;
pub mod service;

pub use cache::{CacheStatus, CachedValue, TtlCache};
pub use cancel::CancellationToken;
pub use config::{CacheConfig, DatasetConfig, EndpointSpec, NetworkConfig, ServiceConfig};
pub use datasets::DatasetKind;
pub use decode::{DecodedTree, PayloadFormat};
pub use error::{CivicDataError, DecodeError, FetchError, FetchErrorKind, NormalizeError, Result};
pub use network::{EndpointConfig, EndpointSet, Fetcher, RawPayload, RetryConfig, TlsMode};
pub use normalize::{canonical_region, CanonicalRecord, NormalizationRule, RuleSet, Transform};
pub use service::{
    AirQualityQuery, CameraQuery, DatasetResponse, DatasetService, DatasetServiceBuilder,
    Freshness, RecordFilter, RefreshScheduler, ReservoirQuery, WeatherQuery,
};
