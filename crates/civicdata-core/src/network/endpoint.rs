//! Endpoint configuration: where a dataset can be fetched from, in priority order.

use crate::datasets::DatasetKind;
use crate::error::{CivicDataError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Certificate verification mode for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    #[default]
    Strict,
    /// Accept invalid or self-signed certificates.
    Relaxed,
}

/// One concrete, fully-resolved network location.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub url: String,
    pub query_params: Vec<(String, String)>,
    pub timeout: Duration,
    pub tls_mode: TlsMode,
    pub browser_user_agent: bool,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            query_params: Vec::new(),
            timeout,
            tls_mode: TlsMode::Strict,
            browser_user_agent: false,
        }
    }

    /// Add a query parameter sent with every request.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Set certificate verification for this endpoint.
    pub fn with_tls_mode(mut self, mode: TlsMode) -> Self {
        self.tls_mode = mode;
        self
    }

    /// Send a browser User-Agent instead of the library one.
    pub fn with_browser_user_agent(mut self, enable: bool) -> Self {
        self.browser_user_agent = enable;
        self
    }

    /// Host name for logging and per-endpoint bookkeeping.
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Ordered, immutable list of alternative endpoints for one dataset.
///
/// Order is priority and is never changed after construction.
#[derive(Debug, Clone)]
pub struct EndpointSet {
    dataset: DatasetKind,
    endpoints: Arc<[EndpointConfig]>,
}

impl EndpointSet {
    pub fn new(dataset: DatasetKind, endpoints: Vec<EndpointConfig>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(CivicDataError::Config {
                message: format!("{}: no usable endpoints configured", dataset),
            });
        }
        for endpoint in &endpoints {
            url::Url::parse(&endpoint.url).map_err(|e| CivicDataError::Config {
                message: format!("{}: invalid endpoint url {}: {}", dataset, endpoint.url, e),
            })?;
        }
        Ok(Self {
            dataset,
            endpoints: endpoints.into(),
        })
    }

    pub fn dataset(&self) -> DatasetKind {
        self.dataset
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&EndpointConfig> {
        self.endpoints.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointConfig> {
        self.endpoints.iter()
    }
}
