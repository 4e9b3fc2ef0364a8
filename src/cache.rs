// 目录缓存：按 (服务器身份, 规范化路径) 缓存，单飞合并并发抓取。
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::path_utils::normalize_remote;
use crate::types::{Entry, Listing, ServerIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    identity: ServerIdentity,
    path: String,
}

type Slot = Arc<Mutex<Option<Listing>>>;

/// Shared listing cache. Entries are read-only snapshots shared by every
/// user whose server identity and path match; per-key async mutexes give
/// single-flight fetches without any cross-key lock.
#[derive(Default)]
pub struct ListingCache {
    slots: DashMap<CacheKey, Slot>,
}

impl ListingCache {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    fn slot(&self, key: CacheKey) -> Slot {
        self.slots.entry(key).or_default().clone()
    }

    /// Return the cached listing for (identity, path) or run `fetch` and
    /// store its result stamped with `fetched_at = now`. The flag reports
    /// whether the listing came from the cache. Concurrent callers for the
    /// same key wait on the same slot, so at most one fetch is in flight
    /// per key; other keys are untouched.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        identity: &ServerIdentity,
        path: &str,
        ttl_secs: f64,
        now: f64,
        fetch: F,
    ) -> Result<(Listing, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Entry>>>,
    {
        let normalized = normalize_remote(path);
        let key = CacheKey {
            identity: identity.clone(),
            path: normalized.clone(),
        };
        let slot = self.slot(key.clone());
        let mut guard = slot.lock().await;
        if let Some(listing) = guard.as_ref() {
            if !listing.is_expired(now) {
                debug!(path = %normalized, "listing cache hit");
                return Ok((listing.clone(), true));
            }
            // Lazily evict on expiry; the refetch below replaces it.
            *guard = None;
        }
        let entries = fetch().await?;
        let listing = Listing::new(identity.clone(), &normalized, entries, now, ttl_secs);
        *guard = Some(listing.clone());
        debug!(path = %normalized, count = listing.entries.len(), "listing cached");
        Ok((listing, false))
    }

    /// Drop the entry for one path under one identity.
    pub fn invalidate(&self, identity: &ServerIdentity, path: &str) {
        let key = CacheKey {
            identity: identity.clone(),
            path: normalize_remote(path),
        };
        self.slots.remove(&key);
    }

    /// Drop every entry under one identity ("clear my cache").
    pub fn invalidate_server(&self, identity: &ServerIdentity) {
        self.slots.retain(|key, _| key.identity != *identity);
    }

    pub fn invalidate_all(&self) {
        self.slots.clear();
    }

    /// Optional memory reclaim: drop expired entries without touching
    /// slots whose fetch is currently in flight.
    pub fn sweep(&self, now: f64) {
        self.slots.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => match guard.as_ref() {
                Some(listing) => !listing.is_expired(now),
                None => false,
            },
            Err(_) => true,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
