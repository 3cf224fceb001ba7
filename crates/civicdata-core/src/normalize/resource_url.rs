//! Resource URL handling: relative resolution and cache-defeating stamps.

use crate::config::NetworkConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Millisecond stamp that strictly increases across calls within the process.
pub fn next_stamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let previous = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}

/// Resolve absolute, root-relative, relative or protocol-relative references.
///
/// Returns `None` for references that cannot be made absolute.
pub fn resolve(raw: &str, base: Option<&Url>) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.and_then(|b| b.join(raw).ok()),
        Err(_) => None,
    }
}

/// Replace any existing stamp parameter with a fresh one.
pub fn with_cache_bust(mut url: Url, stamp: u64) -> Url {
    let param = NetworkConfig::CACHE_BUST_PARAM;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(param, &stamp.to_string());
    }
    url
}
