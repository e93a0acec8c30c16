//! Two-tier cache manager
//!
//! Provides a `CacheManager` that keeps entries in memory and mirrors them to a
//! durable store. Each entry carries its own expiry timestamp; expired entries
//! are never returned and are purged lazily on read or by `clean_expired`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::key::CacheKey;
use super::store::{DurableStore, FileStore, StoreError};

/// Time-to-live applied when a caller doesn't supply one
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A cached value as persisted in the durable tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// The cached payload
    pub data: Value,
    /// Epoch milliseconds at which the entry becomes stale
    pub expiry: i64,
    /// Epoch milliseconds at which the entry was written
    pub created: i64,
}

impl CacheRecord {
    fn new(data: Value, now_ms: i64, ttl: Duration) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            data,
            expiry: now_ms.saturating_add(ttl_ms),
            created: now_ms,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expiry
    }
}

/// Outcome of a durable-tier sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Records examined
    pub scanned: usize,
    /// Records removed because they had expired
    pub expired: usize,
    /// Records removed because they could not be parsed
    pub corrupt: usize,
    /// Records that could not be read or removed
    pub failed: usize,
    /// Leftovers of interrupted writes that were removed
    pub incomplete: usize,
}

impl SweepStats {
    pub fn removed(&self) -> usize {
        self.expired + self.corrupt + self.incomplete
    }
}

/// Read-through, write-through cache over a memory tier and a durable tier
///
/// The memory tier is a cache of the durable tier: durable hits are promoted
/// into memory. Durable failures are logged and swallowed so callers only ever
/// see a value or absence.
#[derive(Debug)]
pub struct CacheManager {
    memory: Mutex<HashMap<String, CacheRecord>>,
    /// Bumped under the memory lock whenever entries are dropped
    removals: AtomicU64,
    durable: Box<dyn DurableStore>,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    /// Creates a cache over the given durable store using wall-clock time
    pub fn new(durable: impl DurableStore + 'static) -> Self {
        Self::with_clock(durable, Arc::new(SystemClock))
    }

    /// Creates a cache with an explicit time source
    pub fn with_clock(durable: impl DurableStore + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            removals: AtomicU64::new(0),
            durable: Box::new(durable),
            clock,
        }
    }

    /// Opens a file-backed cache rooted at `dir`, creating the directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self::new(FileStore::open(dir)?))
    }

    fn memory(&self) -> MutexGuard<'_, HashMap<String, CacheRecord>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value for `key` decoded as `T`, or `None` on a miss
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(key = %key, error = %e, "Cached value has unexpected shape, treating as miss");
                None
            }
        }
    }

    /// Returns the raw cached value for `key`, or `None` on a miss
    pub fn get_value(&self, key: &CacheKey) -> Option<Value> {
        let name = key.to_string();
        let now = self.clock.now_millis();

        let removals_seen = {
            let mut memory = self.memory();
            if let Some(record) = memory.get(&name) {
                if !record.is_expired(now) {
                    debug!(key = %name, "Memory cache hit");
                    return Some(record.data.clone());
                }
                debug!(key = %name, "Evicting expired memory entry");
                memory.remove(&name);
            }
            self.removals.load(Ordering::SeqCst)
        };

        let raw = match self.durable.read(&name) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %name, error = %e, "Failed to read durable cache record");
                return None;
            }
        };

        let record: CacheRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %name, error = %e, "Dropping corrupt durable cache record");
                self.remove_durable(&name);
                return None;
            }
        };

        if record.is_expired(now) {
            debug!(key = %name, "Removing expired durable cache record");
            self.remove_durable(&name);
            return None;
        }

        let mut memory = self.memory();
        if self.removals.load(Ordering::SeqCst) != removals_seen {
            // Cleared or invalidated while we were reading; don't resurrect it
            debug!(key = %name, "Durable cache hit, not promoting");
            return Some(record.data);
        }
        debug!(key = %name, "Durable cache hit, promoting to memory");
        // A concurrent set wins over the record we just read
        let promoted = memory.entry(name).or_insert(record);
        Some(promoted.data.clone())
    }

    /// Caches `value` under `key` for `ttl` (24 hours when `None`)
    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>) {
        match serde_json::to_value(value) {
            Ok(value) => self.set_value(key, value, ttl.unwrap_or(DEFAULT_TTL)),
            Err(e) => warn!(key = %key, error = %e, "Value could not be serialized, not caching"),
        }
    }

    /// Caches a raw value. The memory write always happens; the durable write
    /// is best-effort.
    pub fn set_value(&self, key: &CacheKey, value: Value, ttl: Duration) {
        let name = key.to_string();
        let record = CacheRecord::new(value, self.clock.now_millis(), ttl);

        match serde_json::to_string(&record) {
            Ok(json) => {
                if let Err(e) = self.durable.write(&name, &json) {
                    warn!(key = %name, error = %e, "Failed to write durable cache record");
                }
            }
            Err(e) => warn!(key = %name, error = %e, "Failed to encode durable cache record"),
        }

        self.memory().insert(name, record);
    }

    /// Drops one entry from both tiers
    pub fn invalidate(&self, key: &CacheKey) {
        let name = key.to_string();
        {
            let mut memory = self.memory();
            memory.remove(&name);
            self.removals.fetch_add(1, Ordering::SeqCst);
        }
        self.remove_durable(&name);
    }

    /// Empties both tiers. Durable failures are logged.
    pub fn clear(&self) {
        {
            let mut memory = self.memory();
            memory.clear();
            self.removals.fetch_add(1, Ordering::SeqCst);
        }
        if let Err(e) = self.durable.clear() {
            warn!(error = %e, "Failed to clear durable cache");
        }
    }

    /// Removes expired and corrupt records from the durable tier
    ///
    /// Continues past per-record failures. Safe to call repeatedly.
    pub fn clean_expired(&self) -> SweepStats {
        let mut stats = SweepStats::default();
        let now = self.clock.now_millis();

        let keys = match self.durable.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate durable cache");
                stats.failed += 1;
                return stats;
            }
        };

        for name in keys {
            stats.scanned += 1;

            let raw = match self.durable.read(&name) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %name, error = %e, "Failed to read durable cache record during sweep");
                    stats.failed += 1;
                    continue;
                }
            };

            let corrupt = match serde_json::from_str::<CacheRecord>(&raw) {
                Ok(record) if record.is_expired(now) => false,
                Ok(_) => continue,
                Err(_) => true,
            };

            match self.durable.remove(&name) {
                Ok(()) if corrupt => stats.corrupt += 1,
                Ok(()) => stats.expired += 1,
                Err(e) => {
                    warn!(key = %name, error = %e, "Failed to remove durable cache record during sweep");
                    stats.failed += 1;
                }
            }
        }

        match self.durable.purge_incomplete() {
            Ok(count) => stats.incomplete = count,
            Err(e) => {
                warn!(error = %e, "Failed to purge incomplete durable writes");
                stats.failed += 1;
            }
        }

        if stats.removed() > 0 {
            debug!(
                scanned = stats.scanned,
                expired = stats.expired,
                corrupt = stats.corrupt,
                incomplete = stats.incomplete,
                "Swept durable cache"
            );
        }
        stats
    }

    /// Number of entries currently held in memory, expired or not
    pub fn memory_len(&self) -> usize {
        self.memory().len()
    }

    /// Whether `key` is currently held in the memory tier
    pub fn in_memory(&self, key: &CacheKey) -> bool {
        self.memory().contains_key(&key.to_string())
    }

    fn remove_durable(&self, name: &str) {
        if let Err(e) = self.durable.remove(name) {
            warn!(key = %name, error = %e, "Failed to remove durable cache record");
        }
    }
}
