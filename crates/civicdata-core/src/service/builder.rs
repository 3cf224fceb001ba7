//! Builder for configuring a [`DatasetService`].

use super::DatasetService;
use crate::config::{DatasetConfig, ServiceConfig};
use crate::datasets::{DatasetKind, ResolvedDataset};
use crate::error::Result;
use crate::network::{CircuitBreakerConfig, Fetcher, HttpFetcher, RetryCoordinator};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Builder for configuring a [`DatasetService`].
///
/// # Example
///
/// ```rust,ignore
/// use civicdata_core::DatasetService;
///
/// let service = DatasetService::builder()
///     .api_key("CWA-xxxxxxxx")
///     .build()?;
/// ```
pub struct DatasetServiceBuilder {
    config: ServiceConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    only: Option<Vec<DatasetKind>>,
}

impl Default for DatasetServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetServiceBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
            fetcher: None,
            only: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a JSON file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = ServiceConfig::from_file(path)?;
        Ok(self)
    }

    /// Credential for endpoints that require one. Overrides the configured key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Override the settings of one dataset.
    pub fn dataset(mut self, kind: DatasetKind, config: DatasetConfig) -> Self {
        self.config.datasets.insert(kind, config);
        self
    }

    /// Skip endpoints that keep failing.
    ///
    /// Default: `true`
    pub fn circuit_breaker(mut self, enable: bool) -> Self {
        self.config.circuit_breaker = enable;
        self
    }

    /// Serve only the listed datasets.
    pub fn only(mut self, kinds: impl IntoIterator<Item = DatasetKind>) -> Self {
        self.only = Some(kinds.into_iter().collect());
        self
    }

    /// Use a custom fetcher instead of the HTTP client.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Build the service.
    ///
    /// Fails with a configuration error when a dataset ends up without
    /// endpoints or an endpoint URL does not parse.
    pub fn build(self) -> Result<DatasetService> {
        let kinds = self.only.unwrap_or_else(|| DatasetKind::ALL.to_vec());

        let mut datasets = HashMap::with_capacity(kinds.len());
        for kind in kinds {
            let resolved = ResolvedDataset::resolve(kind.definition(), &self.config)?;
            info!(
                "{}: {} endpoint(s), ttl {:?}",
                kind,
                resolved.endpoints.len(),
                resolved.ttl
            );
            datasets.insert(kind, resolved);
        }

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new()?),
        };
        let mut coordinator = RetryCoordinator::new(fetcher);
        if self.config.circuit_breaker {
            coordinator = coordinator.with_circuit_breakers(CircuitBreakerConfig::default());
        }

        Ok(DatasetService::from_parts(datasets, coordinator))
    }
}
