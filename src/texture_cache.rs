//! Budgeted texture store with usage accounting.
//!
//! Tiled panoramas stream many textures. Each one is wrapped in a
//! [`MediaTexture`] that records how often and how recently it was used, and
//! the [`TextureCache`] drops the least useful entries once the byte budget is
//! exceeded. Locked entries (the base pyramid level) are never dropped so a
//! fallback image is always available.

use std::collections::HashMap;
use std::hash::Hash;

use tracing::debug;

/// Default budget used when the config does not set one.
pub const DEFAULT_TEXTURE_BUDGET: u64 = 256 * 1024 * 1024;

/// A texture plus the bookkeeping used for eviction.
#[derive(Debug)]
pub struct MediaTexture<T> {
    pub texture: T,
    /// Never evicted while set.
    pub locked: bool,
    /// Bytes counted against the budget.
    pub size: u64,
    /// Time of the last access, in seconds.
    pub last_time: f64,
    /// Number of accesses.
    pub count: u32,
}

impl<T> MediaTexture<T> {
    pub fn new(texture: T, size: u64, now: f64) -> Self {
        Self {
            texture,
            locked: false,
            size,
            last_time: now,
            count: 0,
        }
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Record one use at `now`.
    pub fn touch(&mut self, now: f64) {
        self.count = self.count.saturating_add(1);
        self.last_time = now;
    }
}

/// Keyed texture store with a byte budget.
pub struct TextureCache<K, T> {
    entries: HashMap<K, MediaTexture<T>>,
    budget: u64,
    total: u64,
}

impl<K, T> TextureCache<K, T>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
{
    pub fn new(budget: u64) -> Self {
        Self {
            entries: HashMap::new(),
            budget,
            total: 0,
        }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn set_budget(&mut self, budget: u64) {
        self.budget = budget;
    }

    /// Sum of the sizes of all stored entries.
    pub fn total_size(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Store an entry, replacing any previous one under the same key.
    pub fn insert(&mut self, key: K, entry: MediaTexture<T>) {
        self.total += entry.size;
        if let Some(old) = self.entries.insert(key, entry) {
            self.total -= old.size;
        }
    }

    /// Look up an entry and record the access.
    pub fn get(&mut self, key: &K, now: f64) -> Option<&T> {
        let entry = self.entries.get_mut(key)?;
        entry.touch(now);
        Some(&entry.texture)
    }

    /// Look up an entry without touching its statistics.
    pub fn peek(&self, key: &K) -> Option<&MediaTexture<T>> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<MediaTexture<T>> {
        let entry = self.entries.remove(key)?;
        self.total -= entry.size;
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0;
    }

    /// Unlocked keys ordered from first to last eviction candidate.
    ///
    /// Lowest access count goes first; ties go to the oldest access.
    pub fn evict_candidates(&self) -> Vec<K> {
        let mut candidates: Vec<(&K, &MediaTexture<T>)> =
            self.entries.iter().filter(|(_, e)| !e.locked).collect();
        candidates.sort_by(|(_, a), (_, b)| {
            a.count.cmp(&b.count).then(
                a.last_time
                    .partial_cmp(&b.last_time)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        candidates.into_iter().map(|(k, _)| k.clone()).collect()
    }

    /// Drop entries until the store fits the budget, returning what was dropped.
    ///
    /// Stops over budget if only locked entries remain.
    pub fn evict(&mut self) -> Vec<K> {
        if self.total <= self.budget {
            return Vec::new();
        }

        let mut evicted = Vec::new();
        for key in self.evict_candidates() {
            if self.total <= self.budget {
                break;
            }
            if self.remove(&key).is_some() {
                evicted.push(key);
            }
        }

        if !evicted.is_empty() {
            debug!(
                count = evicted.len(),
                total = self.total,
                budget = self.budget,
                "evicted textures"
            );
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_tracks_total_size() {
        let mut cache = TextureCache::new(100);
        cache.insert("a", MediaTexture::new((), 30, 0.0));
        cache.insert("b", MediaTexture::new((), 20, 0.0));
        assert_eq!(cache.total_size(), 50);

        cache.insert("a", MediaTexture::new((), 10, 0.0));
        assert_eq!(cache.total_size(), 30);

        cache.remove(&"b");
        assert_eq!(cache.total_size(), 10);
    }

    #[test]
    fn get_touches_entry() {
        let mut cache = TextureCache::new(100);
        cache.insert("a", MediaTexture::new(7, 1, 0.0));
        assert_eq!(cache.get(&"a", 2.5), Some(&7));
        let entry = cache.peek(&"a").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.last_time, 2.5);
    }

    #[test]
    fn candidates_ordered_by_count_then_age() {
        let mut cache = TextureCache::new(0);
        let mut busy = MediaTexture::new((), 1, 0.0);
        busy.count = 5;
        cache.insert("busy", busy);
        cache.insert("old", MediaTexture::new((), 1, 1.0));
        cache.insert("new", MediaTexture::new((), 1, 9.0));

        assert_eq!(cache.evict_candidates(), vec!["old", "new", "busy"]);
    }

    #[test]
    fn locked_entries_are_never_evicted() {
        let mut cache = TextureCache::new(10);
        cache.insert("base", MediaTexture::new((), 50, 0.0).locked());
        cache.insert("tile-a", MediaTexture::new((), 20, 1.0));
        cache.insert("tile-b", MediaTexture::new((), 20, 2.0));

        let evicted = cache.evict();

        assert_eq!(evicted.len(), 2);
        assert!(cache.contains(&"base"));
        assert!(!cache.evict_candidates().contains(&"base"));
        // Still over budget, only the locked entry is left.
        assert_eq!(cache.total_size(), 50);
        assert!(cache.evict().is_empty());
    }

    #[test]
    fn evict_stops_once_within_budget() {
        let mut cache = TextureCache::new(40);
        cache.insert("a", MediaTexture::new((), 20, 1.0));
        cache.insert("b", MediaTexture::new((), 20, 2.0));
        cache.insert("c", MediaTexture::new((), 20, 3.0));

        assert_eq!(cache.evict(), vec!["a"]);
        assert_eq!(cache.len(), 2);
    }
}
