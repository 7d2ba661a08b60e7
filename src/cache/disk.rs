use crate::error::IngestError;
use chrono::Utc;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Value stored in the persistent tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub created_at: i64,
    pub payload: Vec<u8>,
}

/// Tier 2: RocksDB keyed by `operation:vN:fingerprint`.
///
/// Entries are never rewritten in place. A changed source file or a bumped
/// operation version produces a new key; the old entry is orphaned until a
/// sweep reclaims it.
pub struct DiskCache {
    db: DB,
    path: PathBuf,
}

impl DiskCache {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        debug!("Using '{}' for persistent cache", path.display());
        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        let db = DB::open(&db_options, path)?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>, IngestError> {
        match self.db.get(key.as_bytes())? {
            Some(value) => match bincode::deserialize::<CacheEntry>(&value) {
                Ok(entry) => {
                    trace!("Found {} in persistent cache", key);
                    Ok(Some(entry))
                }
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn put(&self, key: &str, payload: &[u8]) -> Result<(), IngestError> {
        let entry = CacheEntry {
            created_at: Utc::now().timestamp(),
            payload: payload.to_vec(),
        };
        let serialized = bincode::serialize(&entry)?;
        self.db.put(key.as_bytes(), serialized)?;
        trace!("Stored {} in persistent cache", key);
        Ok(())
    }

    pub fn count_keys(&self) -> Result<usize, IngestError> {
        let mut count = 0usize;
        for item in self.db.iterator(IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn clear_all(&self) -> Result<usize, IngestError> {
        let mut batch = WriteBatch::default();
        let mut removed = 0usize;
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete(&key);
            removed += 1;
        }
        self.db.write(batch)?;
        info!("Persistent cache cleared ({} entries)", removed);
        Ok(removed)
    }

    /// Delete entries created more than `max_age` ago. Undecodable entries go too.
    pub fn sweep_older_than(&self, max_age: Duration) -> Result<usize, IngestError> {
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp().saturating_sub(max_age);
        let mut batch = WriteBatch::default();
        let mut removed = 0usize;
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item?;
            let expired = match bincode::deserialize::<CacheEntry>(&value) {
                Ok(entry) => entry.created_at < cutoff,
                Err(_) => true,
            };
            if expired {
                batch.delete(&key);
                removed += 1;
            }
        }
        self.db.write(batch)?;
        info!("Swept {} orphaned cache entries", removed);
        Ok(removed)
    }
}
