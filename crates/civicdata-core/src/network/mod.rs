//! Network layer: endpoints, single fetches, retries and failover.
//!
//! This module provides:
//! - Immutable endpoint configuration in fixed priority order
//! - One-shot HTTP fetches with typed errors
//! - Retry with linear backoff, then failover to the next endpoint
//! - Per-endpoint circuit breakers

mod circuit_breaker;
mod endpoint;
mod fetch;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use endpoint::{EndpointConfig, EndpointSet, TlsMode};
pub use fetch::{Fetcher, HttpFetcher, RawPayload};
pub use retry::{Backoff, ResolutionStats, RetryConfig, RetryCoordinator};

#[cfg(test)]
pub(crate) use retry::tests::ScriptedFetcher;
