//! Centralized configuration for civicdata.
//!
//! Compile-time defaults live as associated constants; the runtime surface is
//! [`ServiceConfig`], which is plain serde data so it can come from a JSON file
//! or be assembled in code.

use crate::datasets::DatasetKind;
use crate::error::{CivicDataError, Result};
use crate::network::TlsMode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

/// Network-related defaults.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    pub const MAX_RETRIES: u32 = 3;
    pub const BASE_DELAY: Duration = Duration::from_millis(500);
    pub const MAX_DELAY: Duration = Duration::from_secs(10);
    pub const USER_AGENT: &'static str = concat!("civicdata/", env!("CARGO_PKG_VERSION"));
    pub const BROWSER_USER_AGENT: &'static str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
    pub const CREDENTIAL_PARAM: &'static str = "Authorization";
    pub const CACHE_BUST_PARAM: &'static str = "_t";
    pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 5;
    pub const CIRCUIT_BREAKER_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);
}

/// Cache-related defaults.
pub struct CacheConfig;

impl CacheConfig {
    pub const SCHEDULER_MIN_INTERVAL: Duration = Duration::from_secs(5);
}

/// One candidate location for a dataset as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    pub url: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub tls_mode: Option<TlsMode>,
    /// Some providers reject requests that do not look like a browser.
    #[serde(default)]
    pub browser_user_agent: bool,
    /// Endpoint is only usable when an API key is configured.
    #[serde(default)]
    pub requires_credential: bool,
    /// Overrides the service-wide credential parameter name for this endpoint.
    #[serde(default)]
    pub credential_param: Option<String>,
}

impl EndpointSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: BTreeMap::new(),
            timeout_ms: None,
            tls_mode: None,
            browser_user_agent: false,
            requires_credential: false,
            credential_param: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_tls_mode(mut self, mode: TlsMode) -> Self {
        self.tls_mode = Some(mode);
        self
    }

    pub fn with_browser_user_agent(mut self) -> Self {
        self.browser_user_agent = true;
        self
    }

    pub fn requiring_credential(mut self) -> Self {
        self.requires_credential = true;
        self
    }

    /// Require the credential and send it under `param`.
    pub fn requiring_credential_as(mut self, param: impl Into<String>) -> Self {
        self.requires_credential = true;
        self.credential_param = Some(param.into());
        self
    }
}

/// Per-dataset overrides. Unset fields fall back to the dataset's built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DatasetConfig {
    pub ttl_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub tls_mode: Option<TlsMode>,
    pub timeout_ms: Option<u64>,
    /// Replaces the built-in endpoint list when non-empty.
    pub endpoints: Vec<EndpointSpec>,
}

/// Startup configuration for a [`crate::DatasetService`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Static credential passed to endpoints that require one.
    pub api_key: Option<String>,
    /// Query parameter name the credential is sent under.
    pub credential_param: String,
    /// Skip endpoints whose circuit breaker is open.
    pub circuit_breaker: bool,
    pub datasets: HashMap<DatasetKind, DatasetConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            credential_param: NetworkConfig::CREDENTIAL_PARAM.to_string(),
            circuit_breaker: true,
            datasets: HashMap::new(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| CivicDataError::Config {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json(&contents)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ServiceConfig =
            serde_json::from_str(json).map_err(|e| CivicDataError::Config {
                message: format!("Invalid configuration: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn dataset(&self, kind: DatasetKind) -> DatasetConfig {
        self.datasets.get(&kind).cloned().unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        if self.credential_param.trim().is_empty() {
            return Err(CivicDataError::Config {
                message: "credentialParam must not be empty".into(),
            });
        }
        for (kind, dataset) in &self.datasets {
            if dataset.max_retries == Some(0) {
                return Err(CivicDataError::Config {
                    message: format!("{}: maxRetries must be at least 1", kind),
                });
            }
            if dataset.timeout_ms == Some(0) {
                return Err(CivicDataError::Config {
                    message: format!("{}: timeoutMs must be positive", kind),
                });
            }
        }
        Ok(())
    }
}
