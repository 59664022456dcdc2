//! Gateway decorator with a bounded in-memory response cache.
//!
//! Members of one household share an address, so the same query string is
//! issued many times per pass. Responses are keyed by the full query and
//! evicted in least-recently-used order.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::errors::VoteTrackResult;
use crate::models::PropertyMatch;
use crate::search::gateway::{SearchGateway, SearchQuery};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Memoizing gateway. A capacity of zero passes every query through.
pub struct CachingGateway<G> {
    inner: G,
    max_entries: usize,
    cache: Mutex<IndexMap<SearchQuery, Vec<PropertyMatch>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<G: SearchGateway> CachingGateway<G> {
    pub fn new(inner: G, max_entries: usize) -> Self {
        Self {
            inner,
            max_entries,
            cache: Mutex::new(IndexMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    fn evict_over_capacity(&self) {
        let mut cache = self.cache.lock();
        while cache.len() > self.max_entries {
            cache.shift_remove_index(0);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.lock().len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<G: SearchGateway> SearchGateway for CachingGateway<G> {
    fn search(&self, query: &SearchQuery) -> VoteTrackResult<Vec<PropertyMatch>> {
        if self.max_entries == 0 {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return self.inner.search(query);
        }
        {
            let mut cache = self.cache.lock();
            if let Some(hits) = cache.shift_remove(query) {
                // Move to end for LRU
                let value = hits.clone();
                cache.insert(query.clone(), hits);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
        }

        // Errors are never cached.
        let hits = self.inner.search(query)?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.cache.lock().insert(query.clone(), hits.clone());
        self.evict_over_capacity();
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::gateway::IndexTarget;
    use crate::search::memory::InMemoryGateway;

    fn fuzzy(text: &str) -> SearchQuery {
        SearchQuery::Fuzzy {
            target: IndexTarget::Address,
            text: text.into(),
        }
    }

    fn gateway() -> InMemoryGateway {
        InMemoryGateway::new(
            vec![PropertyMatch {
                property_id: "1".into(),
                address_full: "12 MAIN ST".into(),
                ..Default::default()
            }],
            vec![],
        )
    }

    #[test]
    fn test_repeated_query_served_from_cache() {
        let cached = CachingGateway::new(gateway(), 8);
        let first = cached.search(&fuzzy("12 MAIN")).unwrap();
        let second = cached.search(&fuzzy("12 MAIN")).unwrap();
        assert_eq!(first, second);
        assert_eq!(cached.inner().request_count(), 1);
        let stats = cached.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cached = CachingGateway::new(gateway(), 0);
        cached.search(&fuzzy("12 MAIN")).unwrap();
        cached.search(&fuzzy("12 MAIN")).unwrap();
        assert_eq!(cached.inner().request_count(), 2);
        assert_eq!(cached.stats().entries, 0);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cached = CachingGateway::new(gateway(), 2);
        cached.search(&fuzzy("a")).unwrap();
        cached.search(&fuzzy("b")).unwrap();
        cached.search(&fuzzy("a")).unwrap();
        cached.search(&fuzzy("c")).unwrap();
        assert_eq!(cached.stats().entries, 2);
        // "b" was evicted, "a" survived.
        cached.search(&fuzzy("a")).unwrap();
        assert_eq!(cached.inner().request_count(), 3);
        cached.search(&fuzzy("b")).unwrap();
        assert_eq!(cached.inner().request_count(), 4);
    }
}
