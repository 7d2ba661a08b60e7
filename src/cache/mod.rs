//! Two-tier result cache with single-flight deduplication.
//!
//! Lookups go memory, then disk (promoting hits into memory), then compute.
//! Computed values are written through both tiers. Concurrent lookups for the
//! same key share one computation.

pub mod disk;
pub mod flight;
pub mod memory;

pub use disk::{CacheEntry, DiskCache};
pub use flight::SingleFlight;
pub use memory::MemoryCache;

use crate::config::CacheConfig;
use crate::error::IngestError;
use crate::hasher::Fingerprint;
use crate::model::Category;
use crate::retry::Retry;
use flight::Join;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Identity of one cached parse. The category is part of it because the same
/// bytes parse into different records depending on where they were found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: String,
    pub version: u32,
    pub category: Category,
    pub fingerprint: Fingerprint,
}

impl CacheKey {
    pub fn new(operation: &str, version: u32, category: Category, fingerprint: Fingerprint) -> Self {
        Self {
            operation: operation.to_string(),
            version,
            category,
            fingerprint,
        }
    }

    pub fn namespace(&self) -> String {
        format!("{}:v{}", self.operation, self.version)
    }

    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.namespace(),
            self.category.as_str(),
            self.fingerprint.to_hex()
        )
    }
}

/// Where a value handed out by [`CacheLayer::get_or_compute`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheSource {
    Memory,
    Disk,
    Computed,
    /// Computed by another caller while this one waited.
    Shared,
}

#[derive(Debug, Clone)]
pub struct Cached<V> {
    pub value: V,
    pub source: CacheSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: usize,
    pub disk_hits: usize,
    pub computed: usize,
    pub shared: usize,
    pub disk_errors: usize,
    pub memory_entries: usize,
    pub memory_bytes: usize,
    pub disk_enabled: bool,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicUsize,
    disk_hits: AtomicUsize,
    computed: AtomicUsize,
    shared: AtomicUsize,
    disk_errors: AtomicUsize,
}

pub struct CacheLayer {
    memory: Mutex<MemoryCache>,
    disk: Option<DiskCache>,
    disk_degraded: AtomicBool,
    flights: SingleFlight,
    retry: Retry,
    bypass: bool,
    counters: Counters,
    warnings: Mutex<Vec<String>>,
}

impl CacheLayer {
    /// Build both tiers from config. A persistent tier that fails to open is
    /// recorded as a warning and the layer runs memory-only.
    pub fn new(config: &CacheConfig, retry: Retry) -> Self {
        let mut warnings = Vec::new();
        let disk = match &config.disk_path {
            Some(path) => match DiskCache::open(path) {
                Ok(disk) => Some(disk),
                Err(e) => {
                    error!("Persistent cache unavailable at {}: {}", path.display(), e);
                    warnings.push(format!(
                        "persistent cache unavailable at {}: {}",
                        path.display(),
                        e
                    ));
                    None
                }
            },
            None => None,
        };

        Self {
            memory: Mutex::new(MemoryCache::new(
                config.memory_max_entries,
                config.memory_max_bytes,
            )),
            disk,
            disk_degraded: AtomicBool::new(false),
            flights: SingleFlight::new(),
            retry,
            bypass: config.bypass,
            counters: Counters::default(),
            warnings: Mutex::new(warnings),
        }
    }

    pub fn has_disk(&self) -> bool {
        self.disk.is_some() && !self.disk_degraded.load(Ordering::SeqCst)
    }

    pub fn get_or_compute<V, F>(&self, key: &CacheKey, compute: F) -> Result<Cached<V>, IngestError>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<V, IngestError>,
    {
        let storage_key = key.storage_key();

        if !self.bypass {
            if let Some((value, _)) = self.memory_lookup::<V>(&storage_key) {
                return Ok(Cached {
                    value,
                    source: CacheSource::Memory,
                });
            }
        }

        let guard = match self.flights.join(&storage_key) {
            Join::Follower(flight) => {
                trace!("Waiting on in-flight computation for {}", storage_key);
                let bytes = flight.wait()?;
                let value = bincode::deserialize::<V>(&bytes)?;
                self.counters.shared.fetch_add(1, Ordering::Relaxed);
                return Ok(Cached {
                    value,
                    source: CacheSource::Shared,
                });
            }
            Join::Leader(guard) => guard,
        };

        if !self.bypass {
            // Another leader may have finished between the fast path and join.
            if let Some((value, bytes)) = self.memory_lookup::<V>(&storage_key) {
                guard.finish(Ok(bytes));
                return Ok(Cached {
                    value,
                    source: CacheSource::Memory,
                });
            }
            if let Some((value, bytes)) = self.disk_lookup::<V>(&storage_key) {
                self.memory_insert(&storage_key, bytes.clone());
                guard.finish(Ok(bytes));
                return Ok(Cached {
                    value,
                    source: CacheSource::Disk,
                });
            }
        }

        let computed = compute().and_then(|value| {
            let bytes = Arc::new(bincode::serialize(&value)?);
            Ok((value, bytes))
        });
        match computed {
            Ok((value, bytes)) => {
                self.counters.computed.fetch_add(1, Ordering::Relaxed);
                self.memory_insert(&storage_key, bytes.clone());
                self.disk_store(&storage_key, &bytes);
                guard.finish(Ok(bytes));
                Ok(Cached {
                    value,
                    source: CacheSource::Computed,
                })
            }
            Err(e) => {
                // Failures are shared with waiters but never cached.
                guard.finish(Err(e.clone()));
                Err(e)
            }
        }
    }

    /// Drain warnings about degraded tiers.
    pub fn take_warnings(&self) -> Vec<String> {
        let mut warnings = self.warnings.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *warnings)
    }

    pub fn stats(&self) -> CacheStats {
        let memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            computed: self.counters.computed.load(Ordering::Relaxed),
            shared: self.counters.shared.load(Ordering::Relaxed),
            disk_errors: self.counters.disk_errors.load(Ordering::Relaxed),
            memory_entries: memory.len(),
            memory_bytes: memory.bytes(),
            disk_enabled: self.has_disk(),
        }
    }

    pub fn disk_len(&self) -> Result<usize, IngestError> {
        match &self.disk {
            Some(disk) => disk.count_keys(),
            None => Ok(0),
        }
    }

    /// Empty both tiers. Returns the number of persistent entries removed.
    pub fn clear(&self) -> Result<usize, IngestError> {
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        match &self.disk {
            Some(disk) => disk.clear_all(),
            None => Ok(0),
        }
    }

    pub fn sweep(&self, max_age: Duration) -> Result<usize, IngestError> {
        match &self.disk {
            Some(disk) => disk.sweep_older_than(max_age),
            None => Ok(0),
        }
    }

    /// Decode a tier 1 entry, handing back the bytes it was decoded from so a
    /// leader can publish them even if the entry is evicted right after.
    fn memory_lookup<V: DeserializeOwned>(&self, key: &str) -> Option<(V, Arc<Vec<u8>>)> {
        let bytes = self
            .memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)?;
        match bincode::deserialize::<V>(&bytes) {
            Ok(value) => {
                trace!("Memory hit for {}", key);
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                Some((value, bytes))
            }
            Err(e) => {
                debug!("Dropping undecodable memory entry {}: {}", key, e);
                self.memory
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(key);
                None
            }
        }
    }

    fn memory_insert(&self, key: &str, bytes: Arc<Vec<u8>>) {
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), bytes);
    }

    fn disk_lookup<V: DeserializeOwned>(&self, key: &str) -> Option<(V, Arc<Vec<u8>>)> {
        let disk = self.active_disk()?;
        match self.retry.run(|| disk.get(key)) {
            Ok(Some(entry)) => match bincode::deserialize::<V>(&entry.payload) {
                Ok(value) => {
                    trace!("Disk hit for {}", key);
                    self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                    Some((value, Arc::new(entry.payload)))
                }
                Err(e) => {
                    warn!("Ignoring undecodable persistent entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.degrade(&e);
                None
            }
        }
    }

    fn disk_store(&self, key: &str, bytes: &[u8]) {
        let Some(disk) = self.active_disk() else {
            return;
        };
        if let Err(e) = self.retry.run(|| disk.put(key, bytes)) {
            self.degrade(&e);
        }
    }

    fn active_disk(&self) -> Option<&DiskCache> {
        if self.disk_degraded.load(Ordering::SeqCst) {
            return None;
        }
        self.disk.as_ref()
    }

    fn degrade(&self, err: &IngestError) {
        self.counters.disk_errors.fetch_add(1, Ordering::Relaxed);
        if self.disk_degraded.swap(true, Ordering::SeqCst) {
            return;
        }
        error!("Persistent cache failed, continuing memory-only: {}", err);
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("persistent cache disabled for this run: {}", err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use std::thread;

    fn memory_only() -> CacheConfig {
        CacheConfig {
            disk_path: None,
            ..CacheConfig::default()
        }
    }

    fn key(n: u64) -> CacheKey {
        CacheKey::new("parse", 1, Category::Post, Fingerprint::Stat(n))
    }

    #[test]
    fn test_storage_key_format() {
        let k = key(0xab);
        assert_eq!(k.namespace(), "parse:v1");
        assert_eq!(k.storage_key(), "parse:v1:posts:s00000000000000ab");
    }

    #[test]
    fn test_same_fingerprint_in_other_category_is_a_miss() {
        let cache = CacheLayer::new(&memory_only(), Retry::new(RetryPolicy::none()));
        let fingerprint = Fingerprint::Content([7; 32]);
        let story = CacheKey::new("parse", 1, Category::Story, fingerprint);
        let reel = CacheKey::new("parse", 1, Category::Reel, fingerprint);
        assert_ne!(story.storage_key(), reel.storage_key());

        cache.get_or_compute(&story, || Ok("story".to_string())).unwrap();
        let got = cache.get_or_compute(&reel, || Ok("reel".to_string())).unwrap();
        assert_eq!(got.source, CacheSource::Computed);
        assert_eq!(got.value, "reel");
    }

    #[test]
    fn test_memory_lookup_bytes_survive_eviction() {
        let config = CacheConfig {
            disk_path: None,
            memory_max_entries: 1,
            ..CacheConfig::default()
        };
        let cache = CacheLayer::new(&config, Retry::new(RetryPolicy::none()));
        cache.get_or_compute(&key(10), || Ok(10u32)).unwrap();

        let (value, bytes) = cache.memory_lookup::<u32>(&key(10).storage_key()).unwrap();
        cache.get_or_compute(&key(11), || Ok(11u32)).unwrap();
        assert!(cache.memory_lookup::<u32>(&key(10).storage_key()).is_none());

        assert_eq!(value, 10);
        assert_eq!(bincode::deserialize::<u32>(&bytes).unwrap(), 10);
    }

    #[test]
    fn test_second_lookup_hits_memory() {
        let cache = CacheLayer::new(&memory_only(), Retry::new(RetryPolicy::none()));
        let first = cache
            .get_or_compute(&key(1), || Ok(vec!["a".to_string()]))
            .unwrap();
        assert_eq!(first.source, CacheSource::Computed);

        let second = cache
            .get_or_compute::<Vec<String>, _>(&key(1), || panic!("must not recompute"))
            .unwrap();
        assert_eq!(second.source, CacheSource::Memory);
        assert_eq!(second.value, vec!["a".to_string()]);
        assert_eq!(cache.stats().memory_hits, 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = CacheLayer::new(&memory_only(), Retry::new(RetryPolicy::none()));
        let failed: Result<Cached<u32>, _> =
            cache.get_or_compute(&key(2), || Err(IngestError::malformed("bad")));
        assert!(failed.is_err());
        let ok = cache.get_or_compute(&key(2), || Ok(5u32)).unwrap();
        assert_eq!(ok.source, CacheSource::Computed);
    }

    #[test]
    fn test_bypass_recomputes_but_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            disk_path: Some(dir.path().join("cache.db")),
            bypass: true,
            ..CacheConfig::default()
        };
        let cache = CacheLayer::new(&config, Retry::new(RetryPolicy::none()));
        cache.get_or_compute(&key(3), || Ok(1u32)).unwrap();
        let again = cache.get_or_compute(&key(3), || Ok(1u32)).unwrap();
        assert_eq!(again.source, CacheSource::Computed);
        assert_eq!(cache.disk_len().unwrap(), 1);
    }

    #[test]
    fn test_disk_hit_after_memory_is_lost() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            disk_path: Some(dir.path().join("cache.db")),
            ..CacheConfig::default()
        };
        {
            let cache = CacheLayer::new(&config, Retry::new(RetryPolicy::none()));
            cache.get_or_compute(&key(4), || Ok(42u64)).unwrap();
        }
        let cache = CacheLayer::new(&config, Retry::new(RetryPolicy::none()));
        let hit = cache
            .get_or_compute::<u64, _>(&key(4), || panic!("must not recompute"))
            .unwrap();
        assert_eq!(hit.source, CacheSource::Disk);
        assert_eq!(hit.value, 42);

        let promoted = cache
            .get_or_compute::<u64, _>(&key(4), || panic!("must not recompute"))
            .unwrap();
        assert_eq!(promoted.source, CacheSource::Memory);
    }

    #[test]
    fn test_unopenable_disk_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let config = CacheConfig {
            disk_path: Some(blocker.join("cache.db")),
            ..CacheConfig::default()
        };
        let cache = CacheLayer::new(&config, Retry::new(RetryPolicy::none()));
        assert!(!cache.has_disk());
        assert_eq!(cache.take_warnings().len(), 1);
        assert!(cache.take_warnings().is_empty());

        let value = cache.get_or_compute(&key(5), || Ok(9u8)).unwrap();
        assert_eq!(value.value, 9);
    }

    #[test]
    fn test_concurrent_lookups_compute_once() {
        let cache = CacheLayer::new(&memory_only(), Retry::new(RetryPolicy::none()));
        let calls = AtomicUsize::new(0);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let got = cache
                        .get_or_compute(&key(6), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(String::from("parsed"))
                        })
                        .unwrap();
                    assert_eq!(got.value, "parsed");
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
