//! Content-hash deduplication cache.

use lru::LruCache;
use xxhash_rust::xxh3::xxh3_64;

/// Default number of distinct lines remembered before eviction.
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Hash under which a line is remembered.
#[must_use]
pub fn line_hash(line: &str) -> u64 {
    xxh3_64(line.as_bytes())
}

/// Remembers recently seen lines by their 64-bit xxh3 hash.
///
/// When the number of remembered hashes exceeds `max_entries`, the least
/// recently seen hashes are dropped until half of `max_entries` remain,
/// never fewer than one.
/// A repeated line refreshes its recency.
pub struct DedupCache {
    seen: LruCache<u64, ()>,
    max_entries: usize,
    evictions: u64,
}

impl DedupCache {
    /// Creates a cache that holds at most `max_entries` hashes.
    ///
    /// A zero capacity is treated as one.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            seen: LruCache::unbounded(),
            max_entries: max_entries.max(1),
            evictions: 0,
        }
    }

    /// Returns `true` the first time a line is observed, `false` for repeats.
    pub fn check_and_insert(&mut self, line: &str) -> bool {
        let hash = line_hash(line);
        if self.seen.get(&hash).is_some() {
            return false;
        }

        self.seen.put(hash, ());
        if self.seen.len() > self.max_entries {
            self.evict();
        }
        true
    }

    /// Returns `true` if the line is currently remembered, without touching recency.
    #[must_use]
    pub fn contains(&self, line: &str) -> bool {
        self.seen.contains(&line_hash(line))
    }

    /// Drops a remembered hash. Returns `true` if it was present.
    pub fn forget_hash(&mut self, hash: u64) -> bool {
        self.seen.pop(&hash).is_some()
    }

    fn evict(&mut self) {
        let target = (self.max_entries / 2).max(1);
        let before = self.seen.len();
        while self.seen.len() > target {
            if self.seen.pop_lru().is_none() {
                break;
            }
        }
        self.evictions += 1;
        tracing::debug!(
            dropped = before - self.seen.len(),
            remaining = self.seen.len(),
            "dedup cache eviction"
        );
    }

    /// Number of hashes currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns `true` if nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of eviction passes run so far.
    #[must_use]
    pub const fn evictions(&self) -> u64 {
        self.evictions
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl std::fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupCache")
            .field("len", &self.seen.len())
            .field("max_entries", &self.max_entries)
            .field("evictions", &self.evictions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_sighting_is_new_repeat_is_not() {
        let mut cache = DedupCache::new(10);
        assert!(cache.check_and_insert("a"));
        assert!(!cache.check_and_insert("a"));
        assert!(cache.check_and_insert("b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn eviction_halves_the_cache() {
        let mut cache = DedupCache::new(4);
        for line in ["1", "2", "3", "4"] {
            assert!(cache.check_and_insert(line));
        }
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.evictions(), 0);

        assert!(cache.check_and_insert("5"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evictions(), 1);

        // The two most recent survive.
        assert!(cache.contains("4"));
        assert!(cache.contains("5"));
        assert!(!cache.contains("1"));
    }

    #[test]
    fn repeat_refreshes_recency() {
        let mut cache = DedupCache::new(4);
        for line in ["1", "2", "3", "4"] {
            cache.check_and_insert(line);
        }
        assert!(!cache.check_and_insert("1"));

        cache.check_and_insert("5");
        assert!(cache.contains("1"));
        assert!(cache.contains("5"));
        assert!(!cache.contains("2"));
    }

    #[test]
    fn evicted_line_is_new_again() {
        let mut cache = DedupCache::new(2);
        cache.check_and_insert("old");
        cache.check_and_insert("x");
        cache.check_and_insert("y");
        assert!(!cache.contains("old"));
        assert!(cache.check_and_insert("old"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = DedupCache::new(0);
        assert_eq!(cache.max_entries(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_one_still_catches_back_to_back_repeats() {
        let mut cache = DedupCache::new(1);
        assert!(cache.check_and_insert("a"));
        assert!(!cache.check_and_insert("a"));
        assert!(cache.check_and_insert("b"));
        assert!(!cache.check_and_insert("b"));
        assert!(cache.contains("b"));
        assert!(!cache.contains("a"));
    }

    #[test]
    fn forgotten_line_is_new_again() {
        let mut cache = DedupCache::new(10);
        cache.check_and_insert("a");
        assert!(cache.forget_hash(line_hash("a")));
        assert!(!cache.forget_hash(line_hash("a")));
        assert!(cache.check_and_insert("a"));
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(lines in proptest::collection::vec("[a-z]{1,6}", 0..200), max in 1usize..32) {
            let mut cache = DedupCache::new(max);
            for line in &lines {
                cache.check_and_insert(line);
                prop_assert!(cache.len() <= max);
            }
        }

        #[test]
        fn second_pass_within_capacity_is_all_duplicates(lines in proptest::collection::vec("[a-z]{1,6}", 0..50)) {
            let mut cache = DedupCache::new(1000);
            for line in &lines {
                cache.check_and_insert(line);
            }
            for line in &lines {
                prop_assert!(!cache.check_and_insert(line));
            }
        }
    }
}
