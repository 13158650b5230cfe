//! Per-world contact impulse cache for warm starting

use std::collections::BTreeMap;

/// Identifies one manifold point between two bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactKey {
    pub body_min: u32,
    pub body_max: u32,
    pub point: u8,
}

impl ContactKey {
    pub fn new(a: u32, b: u32, point: usize) -> Self {
        Self {
            body_min: a.min(b),
            body_max: a.max(b),
            point: point as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedImpulse {
    normal: f32,
    tangent: f32,
    /// Step on which the entry was last written
    stamp: u64,
}

/// Ordered map from contact point to the impulses solved last time it existed
#[derive(Debug, Clone, Default)]
pub struct WarmStartCache {
    entries: BTreeMap<ContactKey, CachedImpulse>,
}

impl WarmStartCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached `(normal, tangent)` impulses for a point
    pub fn lookup(&self, key: &ContactKey) -> Option<(f32, f32)> {
        self.entries.get(key).map(|e| (e.normal, e.tangent))
    }

    pub fn store(&mut self, key: ContactKey, normal: f32, tangent: f32, stamp: u64) {
        self.entries.insert(key, CachedImpulse { normal, tangent, stamp });
    }

    /// Drop entries not refreshed for `max_age` steps. Returns how many went.
    pub fn evict(&mut self, current_step: u64, max_age: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| current_step.saturating_sub(entry.stamp) < max_age);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_independent() {
        assert_eq!(ContactKey::new(7, 2, 1), ContactKey::new(2, 7, 1));
        assert_ne!(ContactKey::new(2, 7, 0), ContactKey::new(2, 7, 1));
    }

    #[test]
    fn test_eviction_by_age() {
        let mut cache = WarmStartCache::new();
        cache.store(ContactKey::new(0, 1, 0), 3.0, 0.5, 10);
        cache.store(ContactKey::new(0, 2, 0), 1.0, 0.0, 12);

        assert_eq!(cache.evict(13, 4), 0);
        assert_eq!(cache.evict(14, 4), 1);
        assert_eq!(cache.lookup(&ContactKey::new(0, 1, 0)), None);
        assert_eq!(cache.lookup(&ContactKey::new(2, 0, 0)), Some((1.0, 0.0)));
        assert_eq!(cache.len(), 1);
    }
}
