mod builder;
mod cache;
mod selector;

pub use selector::ServedState;

use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{ContentItem, FilterSet};
use crate::random::RandomSource;
use crate::tmdb::TmdbApi;
use cache::PoolCache;

/// The full deduplicated, shuffled candidate list for one filter set.
/// Replaced wholesale on rebuild, never mutated in place.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionPool {
    pub key: String,
    pub items: Vec<ContentItem>,
}

/// Owns the memoized pool and serves picks from it. Holds no per-session
/// state: the caller owns the served-id set and threads it through `next`.
pub struct Suggester {
    tmdb: Arc<dyn TmdbApi>,
    random: Arc<dyn RandomSource>,
    cache: Mutex<PoolCache>,
}

impl Suggester {
    pub fn new(tmdb: Arc<dyn TmdbApi>, random: Arc<dyn RandomSource>) -> Self {
        Self {
            tmdb,
            random,
            cache: Mutex::new(PoolCache::default()),
        }
    }

    /// Build the pool for `filters`, or return the cached one: one build
    /// per distinct filter set until invalidated. Empty pools are not
    /// memoized, so a zero-hit filter set re-queries on the next call.
    pub async fn build(&self, filters: &FilterSet) -> Result<SuggestionPool> {
        let key = filters.cache_key();
        {
            let mut cache = self.cache.lock().await;
            if cache.key() != Some(key.as_str()) {
                cache.invalidate();
            }
            if let Some(pool) = cache.get(&key).filter(|p| !p.items.is_empty()) {
                return Ok(pool.clone());
            }
        }

        // The lock is not held across the fetch; overlapping builds for the
        // same key race and the last store wins.
        let items =
            builder::build_items(self.tmdb.as_ref(), self.random.as_ref(), filters).await?;
        let pool = SuggestionPool {
            key: key.clone(),
            items,
        };
        self.cache.lock().await.set(key, pool.clone());
        Ok(pool)
    }

    /// The next not-yet-served item, `None` when nothing matches the
    /// filters, or the pool's first item again once everything was served
    /// (the caller detects the repeated id and resets its tracking).
    pub async fn next(
        &self,
        filters: &FilterSet,
        exclude_ids: &HashSet<i32>,
    ) -> Result<Option<ContentItem>> {
        let pool = self.build(filters).await?;
        Ok(selector::select(&pool, exclude_ids).cloned())
    }

    /// Drop the cached pool. The display layer calls this when the active
    /// filter set changes.
    pub async fn invalidate(&self) {
        self.cache.lock().await.invalidate();
    }
}
