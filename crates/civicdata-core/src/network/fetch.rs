//! Single HTTP GET against one endpoint.
//!
//! Provides a wrapper around reqwest with:
//! - Per-call timeouts taken from the endpoint
//! - Optional relaxed certificate verification
//! - Browser-like user agent for providers that reject bare clients
//! - Every failure mapped onto a typed [`FetchError`]

use crate::config::NetworkConfig;
use crate::error::{CivicDataError, FetchError, Result};
use crate::network::endpoint::{EndpointConfig, TlsMode};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client};
use tracing::debug;

/// Undecoded response body plus where it came from.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub bytes: Bytes,
    /// Declared content type. Informational only; providers get it wrong.
    pub content_type: Option<String>,
    pub url: String,
}

impl RawPayload {
    pub fn new(bytes: impl Into<Bytes>, url: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
            url: url.into(),
        }
    }
}

/// Performs exactly one network call for an endpoint.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, endpoint: &EndpointConfig) -> std::result::Result<RawPayload, FetchError>;
}

/// reqwest-backed fetcher. Both TLS variants are built once and reused.
pub struct HttpFetcher {
    strict: Client,
    relaxed: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            strict: build_client(TlsMode::Strict)?,
            relaxed: build_client(TlsMode::Relaxed)?,
        })
    }

    fn client_for(&self, mode: TlsMode) -> &Client {
        match mode {
            TlsMode::Strict => &self.strict,
            TlsMode::Relaxed => &self.relaxed,
        }
    }
}

fn build_client(mode: TlsMode) -> Result<Client> {
    Client::builder()
        .user_agent(NetworkConfig::USER_AGENT)
        .danger_accept_invalid_certs(mode == TlsMode::Relaxed)
        .build()
        .map_err(|e| CivicDataError::Config {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

fn map_transport_error(endpoint: &EndpointConfig, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::timeout(&endpoint.url, endpoint.timeout)
    } else {
        FetchError::connection(&endpoint.url, err.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, endpoint: &EndpointConfig) -> std::result::Result<RawPayload, FetchError> {
        let mut request = self
            .client_for(endpoint.tls_mode)
            .get(&endpoint.url)
            .query(&endpoint.query_params)
            .timeout(endpoint.timeout);
        if endpoint.browser_user_agent {
            request = request.header(header::USER_AGENT, NetworkConfig::BROWSER_USER_AGENT);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http(&endpoint.url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(endpoint, e))?;

        debug!("GET {} -> {} ({} bytes)", endpoint.url, status, bytes.len());

        Ok(RawPayload {
            bytes,
            content_type,
            url: endpoint.url.clone(),
        })
    }
}
