//! Retry and failover across an [`EndpointSet`].
//!
//! Each endpoint gets up to `max_retries` attempts with backoff between them,
//! then the next endpoint in priority order is tried. Endpoints are never raced.

use crate::config::NetworkConfig;
use crate::error::{CivicDataError, Result};
use crate::network::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::network::endpoint::{EndpointConfig, EndpointSet};
use crate::network::fetch::{Fetcher, RawPayload};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the delay grows between attempts on the same endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `attempt * base_delay`
    Linear,
    /// `base_delay * 2^(attempt - 1)`
    Exponential,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per endpoint, including the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: NetworkConfig::MAX_RETRIES,
            base_delay: NetworkConfig::BASE_DELAY,
            max_delay: NetworkConfig::MAX_DELAY,
            backoff: Backoff::Linear,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of attempts per endpoint.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff curve.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after the given failed attempt (1-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.base_delay.as_secs_f64();
        let delay_secs = match self.backoff {
            Backoff::Linear => base * attempt as f64,
            Backoff::Exponential => base * 2f64.powi(attempt as i32 - 1),
        };
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }

    fn attempts_per_endpoint(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Summary of one resolution, for logging and tests.
#[derive(Debug, Clone, Default)]
pub struct ResolutionStats {
    /// Fetch attempts made across all endpoints.
    pub attempts: u32,
    /// Endpoint that produced the accepted payload.
    pub endpoint_index: Option<usize>,
    /// Endpoints skipped because their circuit was open.
    pub skipped: u32,
    pub total_delay: Duration,
    pub last_error: Option<String>,
}

/// Drives retries and failover over an endpoint set.
pub struct RetryCoordinator {
    fetcher: Arc<dyn Fetcher>,
    breakers: Option<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
    breaker_config: CircuitBreakerConfig,
}

impl RetryCoordinator {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            breakers: None,
            breaker_config: CircuitBreakerConfig::default(),
        }
    }

    /// Skip endpoints that keep failing until their recovery timeout passes.
    pub fn with_circuit_breakers(mut self, config: CircuitBreakerConfig) -> Self {
        self.breakers = Some(RwLock::new(HashMap::new()));
        self.breaker_config = config;
        self
    }

    /// Resolve a raw payload from the first endpoint that answers.
    pub async fn resolve(&self, endpoints: &EndpointSet, retry: &RetryConfig) -> Result<RawPayload> {
        let (payload, _) = self
            .resolve_with(endpoints, retry, |payload| Ok(payload.clone()))
            .await?;
        Ok(payload)
    }

    /// Resolve a payload that `accept` turns into a value.
    ///
    /// A payload rejected by `accept` counts as a failed attempt, so malformed
    /// bodies drive retries and failover exactly like transport errors.
    pub async fn resolve_with<T, F>(
        &self,
        endpoints: &EndpointSet,
        retry: &RetryConfig,
        accept: F,
    ) -> Result<(T, ResolutionStats)>
    where
        F: Fn(&RawPayload) -> Result<T>,
    {
        let dataset = endpoints.dataset();
        let max_attempts = retry.attempts_per_endpoint();
        let mut stats = ResolutionStats::default();

        for (index, endpoint) in endpoints.iter().enumerate() {
            let breaker = self.breaker_for(endpoint);

            for attempt in 1..=max_attempts {
                // Checked per attempt: a failed half-open probe re-opens the circuit.
                if let Some(breaker) = &breaker {
                    if !breaker.allow_request() {
                        if attempt == 1 {
                            warn!("{}: skipping {}, circuit open", dataset, endpoint.url);
                            stats.skipped += 1;
                            stats.last_error = Some(format!("circuit open for {}", endpoint.url));
                        } else {
                            warn!(
                                "{}: circuit opened for {} after {} attempts",
                                dataset,
                                endpoint.url,
                                attempt - 1
                            );
                        }
                        break;
                    }
                }

                stats.attempts += 1;

                let outcome = match self.fetcher.fetch(endpoint).await {
                    Ok(payload) => accept(&payload),
                    Err(e) => Err(CivicDataError::from(e)),
                };

                match outcome {
                    Ok(value) => {
                        if let Some(breaker) = &breaker {
                            breaker.record_success();
                        }
                        if stats.attempts > 1 {
                            info!(
                                "{}: endpoint {} succeeded after {} attempts",
                                dataset, index, stats.attempts
                            );
                        }
                        stats.endpoint_index = Some(index);
                        return Ok((value, stats));
                    }
                    Err(e) => {
                        if let Some(breaker) = &breaker {
                            breaker.record_failure();
                        }
                        stats.last_error = Some(e.to_string());

                        if !e.is_retryable() {
                            warn!("{}: {} failed permanently: {}", dataset, endpoint.url, e);
                            break;
                        }
                        if attempt >= max_attempts {
                            warn!(
                                "{}: all {} attempts on {} exhausted. Last error: {}",
                                dataset, max_attempts, endpoint.url, e
                            );
                            break;
                        }

                        let delay = retry.calculate_delay(attempt);
                        stats.total_delay += delay;
                        warn!(
                            "{}: attempt {}/{} on {} failed: {}. Retrying in {:?}",
                            dataset, attempt, max_attempts, endpoint.url, e, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }

            if index + 1 < endpoints.len() {
                debug!("{}: failing over to endpoint {}", dataset, index + 1);
            }
        }

        Err(CivicDataError::AllEndpointsFailed {
            dataset,
            attempts: stats.attempts,
            last_error: stats
                .last_error
                .unwrap_or_else(|| "no endpoint attempted".to_string()),
        })
    }

    fn breaker_for(&self, endpoint: &EndpointConfig) -> Option<Arc<CircuitBreaker>> {
        let breakers = self.breakers.as_ref()?;
        if let Some(existing) = breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&endpoint.url)
        {
            return Some(existing.clone());
        }
        let mut map = breakers.write().unwrap_or_else(|e| e.into_inner());
        let breaker = map.entry(endpoint.url.clone()).or_insert_with(|| {
            Arc::new(CircuitBreaker::with_config(
                endpoint.url.clone(),
                self.breaker_config.clone(),
            ))
        });
        Some(breaker.clone())
    }
}
