use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

struct Slot {
    value: Arc<Vec<u8>>,
    tick: u64,
}

/// Tier 1: in-process LRU bounded by entry count and payload bytes.
///
/// Losing its contents changes no observable result; it only saves a trip to
/// the persistent tier or a re-parse.
pub struct MemoryCache {
    max_entries: usize,
    max_bytes: usize,
    bytes: usize,
    tick: u64,
    entries: HashMap<String, Slot>,
    // tick -> key, oldest first
    order: BTreeMap<u64, String>,
}

impl MemoryCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            max_entries,
            max_bytes,
            bytes: 0,
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_entries > 0 && self.max_bytes > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn get(&mut self, key: &str) -> Option<Arc<Vec<u8>>> {
        let tick = self.next_tick();
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.tick);
        slot.tick = tick;
        self.order.insert(tick, key.to_string());
        Some(slot.value.clone())
    }

    pub fn insert(&mut self, key: String, value: Arc<Vec<u8>>) {
        self.remove(&key);
        if !self.is_enabled() || value.len() > self.max_bytes {
            return;
        }

        let tick = self.next_tick();
        self.bytes += value.len();
        self.order.insert(tick, key.clone());
        self.entries.insert(key, Slot { value, tick });

        while self.entries.len() > self.max_entries || self.bytes > self.max_bytes {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some(slot) = self.entries.remove(&oldest) {
                self.bytes -= slot.value.len();
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(slot) => {
                self.order.remove(&slot.tick);
                self.bytes -= slot.value.len();
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.bytes = 0;
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(n: usize) -> Arc<Vec<u8>> {
        Arc::new(vec![0u8; n])
    }

    #[test]
    fn test_evicts_least_recently_used_entry() {
        let mut cache = MemoryCache::new(2, 1024);
        cache.insert("a".into(), payload(1));
        cache.insert("b".into(), payload(1));
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), payload(1));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_byte_budget() {
        let mut cache = MemoryCache::new(100, 10);
        cache.insert("a".into(), payload(4));
        cache.insert("b".into(), payload(4));
        cache.insert("c".into(), payload(4));
        assert_eq!(cache.len(), 2);
        assert!(cache.bytes() <= 10);
        assert!(cache.get("a").is_none());

        // Larger than the whole budget: not retained.
        cache.insert("huge".into(), payload(11));
        assert!(cache.get("huge").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replace_updates_byte_count() {
        let mut cache = MemoryCache::new(10, 100);
        cache.insert("a".into(), payload(10));
        cache.insert("a".into(), payload(3));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.bytes(), 3);
    }

    #[test]
    fn test_zero_capacity_disables_tier() {
        let mut cache = MemoryCache::new(0, 100);
        cache.insert("a".into(), payload(1));
        assert!(cache.is_empty());
    }
}
