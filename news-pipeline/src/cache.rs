use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Keyed store with a fixed time-to-live. Expired entries read as absent and are
/// overwritten on the next insert of the same key; `clear` drops everything.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, value)| value)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Live entries only.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = TtlCache::new(Duration::from_millis(20));
        cache.insert("moon", 1);
        assert_eq!(cache.get(&"moon"), Some(&1));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"moon"), None);
        assert!(cache.is_empty());

        // Re-inserting restarts the clock.
        cache.insert("moon", 2);
        assert_eq!(cache.get(&"moon"), Some(&2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_drops_live_entries() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }
}
