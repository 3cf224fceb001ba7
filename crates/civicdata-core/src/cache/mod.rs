//! In-memory TTL cache with single-flight refresh and stale fallback.
//!
//! One slot per dataset. A slot moves through Empty → Fresh → Stale → Fresh;
//! its entry is only ever replaced by a refresh that fully succeeded. While a
//! refresh runs, later callers for the same key wait for it and share its
//! outcome instead of starting their own.

use crate::datasets::DatasetKind;
use crate::error::{CivicDataError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A value handed out by the cache.
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    pub age: Duration,
    /// No refresh was performed on behalf of this call.
    pub served_from_cache: bool,
    /// The last refresh failed and this is the previous value.
    pub stale: bool,
}

/// Snapshot of one cache slot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub dataset: DatasetKind,
    pub has_entry: bool,
    pub fresh: bool,
    pub refreshing: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub age: Option<Duration>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    fetched_at: Instant,
    fetched_at_wall: DateTime<Utc>,
}

impl<T: Clone> Entry<T> {
    fn served(&self, stale: bool) -> CachedValue<T> {
        CachedValue {
            value: self.value.clone(),
            fetched_at: self.fetched_at_wall,
            age: self.fetched_at.elapsed(),
            served_from_cache: true,
            stale,
        }
    }
}

#[derive(Debug)]
struct SlotState<T> {
    entry: Option<Entry<T>>,
    invalidated: bool,
    last_error: Option<String>,
}

impl<T> Default for SlotState<T> {
    fn default() -> Self {
        Self {
            entry: None,
            invalidated: false,
            last_error: None,
        }
    }
}

impl<T: Clone> SlotState<T> {
    fn fresh(&self, ttl: Duration) -> Option<CachedValue<T>> {
        self.entry
            .as_ref()
            .filter(|entry| !self.invalidated && entry.fetched_at.elapsed() < ttl)
            .map(|entry| entry.served(false))
    }

    fn fallback(&self, key: DatasetKind, reason: String) -> Result<CachedValue<T>> {
        match &self.entry {
            Some(entry) => {
                warn!("{}: serving stale value, refresh failed: {}", key, reason);
                Ok(entry.served(true))
            }
            None => Err(CivicDataError::DatasetUnavailable {
                dataset: key,
                reason,
            }),
        }
    }
}

struct Slot<T> {
    /// Held for the whole duration of a refresh.
    flight: Arc<tokio::sync::Mutex<()>>,
    state: Mutex<SlotState<T>>,
    /// Bumped once per completed refresh, under the flight lock.
    generation: AtomicU64,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        Self {
            flight: Arc::new(tokio::sync::Mutex::new(())),
            state: Mutex::new(SlotState::default()),
            generation: AtomicU64::new(0),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn complete(&self, key: DatasetKind, outcome: Result<T>) -> Result<CachedValue<T>> {
        let mut state = self.lock_state();
        let result = match outcome {
            Ok(value) => {
                let entry = Entry {
                    value,
                    fetched_at: Instant::now(),
                    fetched_at_wall: Utc::now(),
                };
                let mut served = entry.served(false);
                served.served_from_cache = false;
                state.entry = Some(entry);
                state.invalidated = false;
                state.last_error = None;
                info!("{}: cache refreshed", key);
                Ok(served)
            }
            Err(e) => {
                let reason = e.to_string();
                state.last_error = Some(reason.clone());
                state.fallback(key, reason)
            }
        };
        self.generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Outcome of the refresh that completed while this caller waited.
    fn last_outcome(&self, key: DatasetKind) -> Result<CachedValue<T>> {
        let state = self.lock_state();
        match (&state.last_error, &state.entry) {
            (None, Some(entry)) => Ok(entry.served(false)),
            (Some(reason), _) => state.fallback(key, reason.clone()),
            (None, None) => Err(CivicDataError::DatasetUnavailable {
                dataset: key,
                reason: "cache cleared during refresh".into(),
            }),
        }
    }
}

/// Per-dataset TTL cache.
pub struct TtlCache<T> {
    slots: Mutex<HashMap<DatasetKind, Arc<Slot<T>>>>,
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> TtlCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<DatasetKind, Arc<Slot<T>>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, key: DatasetKind) -> Arc<Slot<T>> {
        Arc::clone(
            self.lock_slots()
                .entry(key)
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    /// Return the cached value if younger than `ttl`, otherwise refresh.
    ///
    /// A `ttl` of zero means every call refreshes. If the refresh fails the
    /// previous value is returned flagged stale; with no previous value the
    /// result is [`CivicDataError::DatasetUnavailable`].
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: DatasetKind,
        ttl: Duration,
        refresh: F,
    ) -> Result<CachedValue<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.run(key, Some(ttl), refresh).await
    }

    /// Refresh regardless of age. Still joins a refresh already in flight.
    pub async fn refresh<F, Fut>(&self, key: DatasetKind, refresh: F) -> Result<CachedValue<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.run(key, None, refresh).await
    }

    async fn run<F, Fut>(
        &self,
        key: DatasetKind,
        ttl: Option<Duration>,
        refresh: F,
    ) -> Result<CachedValue<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let slot = self.slot(key);
        let seen = slot.generation.load(Ordering::SeqCst);

        if let Some(hit) = ttl.and_then(|ttl| slot.lock_state().fresh(ttl)) {
            debug!("{}: cache hit", key);
            return Ok(hit);
        }

        let guard = Arc::clone(&slot.flight).lock_owned().await;
        if slot.generation.load(Ordering::SeqCst) != seen {
            debug!("{}: joined in-flight refresh", key);
            return slot.last_outcome(key);
        }
        if let Some(hit) = ttl.and_then(|ttl| slot.lock_state().fresh(ttl)) {
            return Ok(hit);
        }

        debug!("{}: refreshing", key);
        let future = refresh();
        let task_slot = Arc::clone(&slot);
        // The task owns the flight lock, so a caller that stops waiting does
        // not abort the refresh and waiters still see its outcome.
        let handle = tokio::spawn(async move {
            let _flight = guard;
            let outcome = future.await;
            task_slot.complete(key, outcome)
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                let reason = format!("refresh task failed: {}", e);
                let mut state = slot.lock_state();
                state.last_error = Some(reason.clone());
                state.fallback(key, reason)
            }
        }
    }

    /// Force the next access to refresh. The current value stays available as
    /// a stale fallback.
    pub fn invalidate(&self, key: DatasetKind) {
        if let Some(slot) = self.lock_slots().get(&key) {
            slot.lock_state().invalidated = true;
        }
    }

    pub fn status(&self, key: DatasetKind, ttl: Duration) -> CacheStatus {
        let slot = self.lock_slots().get(&key).cloned();
        let Some(slot) = slot else {
            return CacheStatus {
                dataset: key,
                has_entry: false,
                fresh: false,
                refreshing: false,
                fetched_at: None,
                age: None,
                last_error: None,
            };
        };

        let refreshing = slot.flight.try_lock().is_err();
        let state = slot.lock_state();
        CacheStatus {
            dataset: key,
            has_entry: state.entry.is_some(),
            fresh: state.fresh(ttl).is_some(),
            refreshing,
            fetched_at: state.entry.as_ref().map(|e| e.fetched_at_wall),
            age: state.entry.as_ref().map(|e| e.fetched_at.elapsed()),
            last_error: state.last_error.clone(),
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock_slots().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const KEY: DatasetKind = DatasetKind::Reservoir;

    type BoxedRefresh = std::pin::Pin<Box<dyn Future<Output = Result<u32>> + Send>>;

    fn counted(calls: &Arc<AtomicUsize>, value: u32) -> impl FnOnce() -> BoxedRefresh {
        let calls = Arc::clone(calls);
        move || -> BoxedRefresh {
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            })
        }
    }

    fn failing() -> BoxedRefresh {
        Box::pin(async {
            Err(CivicDataError::AllEndpointsFailed {
                dataset: KEY,
                attempts: 3,
                last_error: "timeout".into(),
            })
        })
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_is_served_from_cache() {
        let cache = TtlCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let first = cache.get_or_refresh(KEY, ttl, counted(&calls, 1)).await.unwrap();
        let second = cache.get_or_refresh(KEY, ttl, counted(&calls, 2)).await.unwrap();

        assert!(!first.served_from_cache);
        assert!(second.served_from_cache);
        assert_eq!(second.value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refreshes() {
        let cache = TtlCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.get_or_refresh(KEY, Duration::ZERO, counted(&calls, 1)).await.unwrap();
        let second = cache.get_or_refresh(KEY, Duration::ZERO, counted(&calls, 2)).await.unwrap();
        assert_eq!(second.value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_refresh() {
        let cache = Arc::new(TtlCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(KEY, Duration::from_secs(60), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(7u32)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_stale() {
        let cache = TtlCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.get_or_refresh(KEY, Duration::ZERO, counted(&calls, 5)).await.unwrap();

        let stale = cache.get_or_refresh(KEY, Duration::ZERO, failing).await.unwrap();
        assert!(stale.stale);
        assert!(stale.served_from_cache);
        assert_eq!(stale.value, 5);
        assert!(cache.status(KEY, Duration::ZERO).last_error.is_some());
    }

    #[tokio::test]
    async fn test_panicking_refresh_falls_back_to_stale() {
        let cache = TtlCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.get_or_refresh(KEY, Duration::ZERO, counted(&calls, 7)).await.unwrap();

        let panicking = || -> BoxedRefresh {
            Box::pin(async {
                let missing: Option<u32> = None;
                Ok(missing.expect("decoder bug"))
            })
        };
        let stale = cache.get_or_refresh(KEY, Duration::ZERO, panicking).await.unwrap();
        assert!(stale.stale);
        assert_eq!(stale.value, 7);
        let status = cache.status(KEY, Duration::ZERO);
        assert!(status.last_error.unwrap().contains("refresh task failed"));

        let next = cache.get_or_refresh(KEY, Duration::ZERO, counted(&calls, 8)).await.unwrap();
        assert_eq!(next.value, 8);
    }

    #[tokio::test]
    async fn test_failure_without_entry_is_unavailable() {
        let cache: TtlCache<u32> = TtlCache::new();
        let err = cache
            .get_or_refresh(KEY, Duration::from_secs(60), failing)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_caller_does_not_cancel_refresh() {
        let cache = Arc::new(TtlCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let slow = {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(9u32)
            }
        };
        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), cache.get_or_refresh(KEY, ttl, slow)).await;
        assert!(abandoned.is_err());

        let joined = cache.get_or_refresh(KEY, ttl, counted(&calls, 10)).await.unwrap();
        assert_eq!(joined.value, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_forced_refresh() {
        let cache = TtlCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);
        cache.get_or_refresh(KEY, ttl, counted(&calls, 1)).await.unwrap();

        cache.invalidate(KEY);
        assert!(!cache.status(KEY, ttl).fresh);
        let stale = cache.get_or_refresh(KEY, ttl, failing).await.unwrap();
        assert!(stale.stale);

        let forced = cache.refresh(KEY, counted(&calls, 2)).await.unwrap();
        assert_eq!(forced.value, 2);
        assert!(cache.status(KEY, ttl).fresh);
    }

    #[tokio::test]
    async fn test_clear_and_status() {
        let cache = TtlCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        assert!(!cache.status(KEY, Duration::from_secs(1)).has_entry);

        cache.get_or_refresh(KEY, Duration::from_secs(60), counted(&calls, 1)).await.unwrap();
        let status = cache.status(KEY, Duration::from_secs(60));
        assert!(status.has_entry && status.fresh && !status.refreshing);

        cache.clear();
        assert!(!cache.status(KEY, Duration::from_secs(60)).has_entry);
    }
}
