//! Background refresh loop.

use super::DatasetService;
use crate::cancel::CancellationToken;
use crate::config::CacheConfig;
use crate::datasets::DatasetKind;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodically force-refreshes a set of datasets until stopped.
///
/// Refresh failures are logged and never end the loop. The scheduler also
/// stops when its service is shut down.
pub struct RefreshScheduler {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Start polling. `interval` is clamped to [`CacheConfig::SCHEDULER_MIN_INTERVAL`].
    pub fn start(service: DatasetService, interval: Duration, datasets: Vec<DatasetKind>) -> Self {
        let interval = interval.max(CacheConfig::SCHEDULER_MIN_INTERVAL);
        let token = CancellationToken::new();
        let stop = token.clone();
        let shutdown = service.shutdown_token();

        info!("Starting refresh scheduler every {:?} for {:?}", interval, datasets);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                // A stop request abandons the round; refreshes already started
                // finish in the cache's own tasks.
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    _ = refresh_all(&service, &datasets) => {}
                }
            }
            info!("Refresh scheduler stopped");
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Refresh scheduler task failed: {}", e);
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn refresh_all(service: &DatasetService, datasets: &[DatasetKind]) {
    for &kind in datasets {
        match service.refresh(kind).await {
            Ok(response) if response.stale => {
                warn!("{}: scheduled refresh failed, keeping stale data", kind)
            }
            Ok(response) => debug!("{}: scheduled refresh, {} records", kind, response.records.len()),
            Err(e) => warn!("{}: scheduled refresh failed: {}", kind, e),
        }
    }
}
