//! Time-bounded cache for list queries.
//!
//! Entries are keyed by the query and the user that ran it, and expire after the
//! configured TTL. Writes drop affected entries explicitly. Every invalidation also
//! bumps an epoch; a load that started before the bump must not land in the cache,
//! so handlers read [`QueryCache::epoch`] before querying and store through
//! [`QueryCache::insert_if_current`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use moka::future::Cache;

/// Upper bound on cached lists across all users.
const MAX_CACHE_ENTRIES: u64 = 10_000;

/// Which list a cache entry holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheQuery {
    /// Visible plants, newest first
    Plants,
    /// Pending tasks due on a local date in a timezone
    TasksDue { date: NaiveDate, timezone: String },
}

/// Composite cache key: query + owning user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: CacheQuery,
    user_id: String,
}

impl CacheKey {
    fn new(query: CacheQuery, user_id: &str) -> Self {
        Self {
            query,
            user_id: user_id.to_string(),
        }
    }
}

/// Per-user TTL cache shared by all handlers.
pub struct QueryCache<V> {
    entries: Cache<CacheKey, V>,
    epoch: AtomicU64,
}

impl<V: Clone + Send + Sync + 'static> QueryCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MAX_CACHE_ENTRIES)
                .time_to_live(ttl)
                .support_invalidation_closures()
                .build(),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current invalidation epoch. Read it before loading a value to cache.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Return a fresh cached value, if any.
    pub async fn get(&self, query: &CacheQuery, user_id: &str) -> Option<V> {
        self.entries
            .get(&CacheKey::new(query.clone(), user_id))
            .await
    }

    /// Store a value loaded at `epoch`. Returns `false` and stores nothing when an
    /// invalidation ran since then.
    pub async fn insert_if_current(
        &self,
        query: CacheQuery,
        user_id: &str,
        value: V,
        epoch: u64,
    ) -> bool {
        if self.epoch() != epoch {
            return false;
        }
        let key = CacheKey::new(query, user_id);
        self.entries.insert(key.clone(), value).await;

        // An invalidation may have slipped in between the check and the insert
        if self.epoch() != epoch {
            self.entries.invalidate(&key).await;
            return false;
        }
        true
    }

    /// Drop every entry belonging to `user_id`.
    pub fn invalidate_user(&self, user_id: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let owner = user_id.to_string();
        if let Err(e) = self
            .entries
            .invalidate_entries_if(move |key, _| key.user_id == owner)
        {
            tracing::warn!("Falling back to a full cache flush: {}", e);
            self.entries.invalidate_all();
            return;
        }
        tracing::debug!("Invalidated cache entries for user {}", user_id);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.invalidate_all();
    }
}
