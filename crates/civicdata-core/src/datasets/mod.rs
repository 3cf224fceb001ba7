//! Logical datasets and their built-in definitions.
//!
//! Each dataset declares its default endpoints (in priority order), accepted
//! payload formats, default TTL, and the [`RuleSet`] that maps every known
//! upstream shape onto the same canonical keys.

mod air_quality;
mod cameras;
mod radar;
mod reservoir;
mod weather;

use crate::config::{EndpointSpec, NetworkConfig, ServiceConfig};
use crate::decode::PayloadFormat;
use crate::error::Result;
use crate::network::{EndpointConfig, EndpointSet, RetryConfig};
use crate::normalize::RuleSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// One logical dataset served by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Weather,
    Reservoir,
    AirQuality,
    Radar,
    Cameras,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::Weather,
        DatasetKind::Reservoir,
        DatasetKind::AirQuality,
        DatasetKind::Radar,
        DatasetKind::Cameras,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Weather => "weather",
            DatasetKind::Reservoir => "reservoir",
            DatasetKind::AirQuality => "air_quality",
            DatasetKind::Radar => "radar",
            DatasetKind::Cameras => "cameras",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "weather" => Some(DatasetKind::Weather),
            "reservoir" | "reservoirs" => Some(DatasetKind::Reservoir),
            "air_quality" | "aqi" => Some(DatasetKind::AirQuality),
            "radar" => Some(DatasetKind::Radar),
            "cameras" | "cctv" => Some(DatasetKind::Cameras),
            _ => None,
        }
    }

    /// Built-in definition of this dataset.
    pub fn definition(&self) -> DatasetDefinition {
        match self {
            DatasetKind::Weather => weather::definition(),
            DatasetKind::Reservoir => reservoir::definition(),
            DatasetKind::AirQuality => air_quality::definition(),
            DatasetKind::Radar => radar::definition(),
            DatasetKind::Cameras => cameras::definition(),
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static description of a dataset before configuration is applied.
#[derive(Debug, Clone)]
pub struct DatasetDefinition {
    pub kind: DatasetKind,
    pub format: PayloadFormat,
    pub ttl: Duration,
    pub endpoints: Vec<EndpointSpec>,
    pub rules: RuleSet,
}

/// A dataset with configuration applied, ready to be fetched.
#[derive(Debug, Clone)]
pub struct ResolvedDataset {
    pub kind: DatasetKind,
    pub format: PayloadFormat,
    pub ttl: Duration,
    pub retry: RetryConfig,
    pub endpoints: EndpointSet,
    pub rules: Arc<RuleSet>,
}

impl ResolvedDataset {
    /// Merge a definition with the service configuration.
    ///
    /// Endpoints that need a credential are dropped when no API key is
    /// configured; the rest keep their relative order.
    pub fn resolve(definition: DatasetDefinition, config: &ServiceConfig) -> Result<Self> {
        let kind = definition.kind;
        let overrides = config.dataset(kind);

        let ttl = overrides
            .ttl_seconds
            .map(Duration::from_secs)
            .unwrap_or(definition.ttl);
        let mut retry = RetryConfig::new();
        if let Some(max_retries) = overrides.max_retries {
            retry = retry.with_max_retries(max_retries);
        }
        if let Some(base_delay_ms) = overrides.base_delay_ms {
            retry = retry.with_base_delay(Duration::from_millis(base_delay_ms));
        }
        let dataset_timeout = overrides
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(NetworkConfig::REQUEST_TIMEOUT);

        let specs = if overrides.endpoints.is_empty() {
            definition.endpoints
        } else {
            overrides.endpoints
        };

        let mut endpoints = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut endpoint = EndpointConfig::new(
                spec.url.clone(),
                spec.timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(dataset_timeout),
            )
            .with_tls_mode(spec.tls_mode.or(overrides.tls_mode).unwrap_or_default())
            .with_browser_user_agent(spec.browser_user_agent);
            for (key, value) in &spec.query {
                endpoint = endpoint.with_query(key.clone(), value.clone());
            }

            if spec.requires_credential {
                let Some(api_key) = config.api_key.as_deref() else {
                    warn!("{}: skipping {}, no API key configured", kind, spec.url);
                    continue;
                };
                let param = spec
                    .credential_param
                    .as_deref()
                    .unwrap_or(&config.credential_param);
                endpoint = endpoint.with_query(param, api_key);
            }
            endpoints.push(endpoint);
        }

        Ok(Self {
            kind,
            format: definition.format,
            ttl,
            retry,
            endpoints: EndpointSet::new(kind, endpoints)?,
            rules: Arc::new(definition.rules),
        })
    }
}
