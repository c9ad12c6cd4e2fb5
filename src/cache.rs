// src/cache.rs
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::flag::FlagSet;

/// Outcome of a [`FlagCache::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// The candidate differed from the stored set and replaced it.
    Swapped,
    /// The candidate was structurally equal to the stored set; nothing
    /// observable changed.
    Unchanged,
    /// The candidate came from a refresh older than one already
    /// committed and was discarded.
    Superseded,
}

struct CacheInner {
    flags: Arc<FlagSet>,
    generation: u64,
    last_fetched: Option<DateTime<Utc>>,
}

/// The committed flag snapshot shared between the refresh task and
/// `get` callers.
///
/// The refresh task is the sole writer; readers only clone the current
/// `Arc<FlagSet>` out of the lock, so a read always observes a complete
/// set and never blocks on network I/O.
pub struct FlagCache {
    inner: RwLock<CacheInner>,
}

impl FlagCache {
    /// Seeds the cache. The seed carries generation 0 so the first real
    /// refresh always wins the generation check.
    pub fn seeded_with(fallback: FlagSet) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                flags: Arc::new(fallback),
                generation: 0,
                last_fetched: None,
            }),
        }
    }

    /// Latest committed set. Never blocks beyond the snapshot lock.
    pub fn read(&self) -> Arc<FlagSet> {
        let inner = self.inner.read().unwrap();
        Arc::clone(&inner.flags)
    }

    /// Compare-and-swap with ordering: replaces the stored set only if
    /// `generation` is newer than the committed one and `candidate`
    /// differs structurally from what is stored.
    ///
    /// An equal candidate still advances the generation, so a stale
    /// duplicate arriving later is still recognized as superseded.
    pub fn commit(&self, generation: u64, candidate: FlagSet) -> Commit {
        let mut inner = self.inner.write().unwrap();

        if generation <= inner.generation {
            return Commit::Superseded;
        }
        inner.generation = generation;

        if *inner.flags == candidate {
            return Commit::Unchanged;
        }

        inner.flags = Arc::new(candidate);
        Commit::Swapped
    }

    /// Records a successful remote fetch, whether or not it changed the
    /// committed set.
    pub fn mark_fetched(&self, at: DateTime<Utc>) {
        let mut inner = self.inner.write().unwrap();
        inner.last_fetched = Some(at);
    }

    /// Timestamp of the last successful remote fetch. `None` until the
    /// first refresh succeeds; the fallback seed does not count.
    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().unwrap();
        inner.last_fetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::FlagEntry;

    fn set(pairs: &[(&str, &str)]) -> FlagSet {
        FlagSet::new(
            pairs
                .iter()
                .map(|(n, v)| FlagEntry::new(*n, *v))
                .collect(),
        )
    }

    #[test]
    fn read_returns_seed_before_any_commit() {
        let cache = FlagCache::seeded_with(set(&[("FeatureOne", "false")]));
        assert_eq!(cache.read().value_of("FeatureOne"), Some("false"));
        assert_eq!(cache.last_fetched(), None);
    }

    #[test]
    fn commit_swaps_only_when_different() {
        let cache = FlagCache::seeded_with(set(&[("a", "1")]));

        assert_eq!(cache.commit(1, set(&[("a", "2")])), Commit::Swapped);
        assert_eq!(cache.read().value_of("a"), Some("2"));

        // Identical body: no swap, observably a no-op.
        assert_eq!(cache.commit(2, set(&[("a", "2")])), Commit::Unchanged);
        assert_eq!(cache.read().value_of("a"), Some("2"));
    }

    #[test]
    fn equal_seed_commit_is_a_noop() {
        let fallback = set(&[("FeatureOne", "false")]);
        let cache = FlagCache::seeded_with(fallback.clone());
        let before = cache.read();

        assert_eq!(cache.commit(1, fallback), Commit::Unchanged);
        assert!(Arc::ptr_eq(&before, &cache.read()));
    }

    #[test]
    fn stale_generation_is_discarded() {
        let cache = FlagCache::seeded_with(FlagSet::empty());

        assert_eq!(cache.commit(2, set(&[("late", "winner")])), Commit::Swapped);
        assert_eq!(
            cache.commit(1, set(&[("early", "loser")])),
            Commit::Superseded
        );
        assert_eq!(cache.read().value_of("late"), Some("winner"));
        assert_eq!(cache.read().value_of("early"), None);
    }

    #[test]
    fn unchanged_commit_still_advances_generation() {
        let cache = FlagCache::seeded_with(FlagSet::empty());

        assert_eq!(cache.commit(2, FlagSet::empty()), Commit::Unchanged);
        // A slower refresh from before the unchanged commit still loses.
        assert_eq!(cache.commit(1, set(&[("x", "1")])), Commit::Superseded);
    }

    #[test]
    fn mark_fetched_is_visible() {
        let cache = FlagCache::seeded_with(FlagSet::empty());
        let now = Utc::now();
        cache.mark_fetched(now);
        assert_eq!(cache.last_fetched(), Some(now));
    }
}
