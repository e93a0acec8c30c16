//! Day-scoped client cache
//!
//! Entries are stored as `{data, timestamp}` and are only trusted on the local
//! calendar day they were written, no matter how few hours have passed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::key::CacheKey;
use super::store::DurableStore;
use crate::data::AllMenus;

/// Records older than this are removed by `DayCache::sweep`
pub const MAX_RECORD_AGE_DAYS: i64 = 7;

/// A client-side record as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayRecord<T> {
    pub data: T,
    /// Epoch milliseconds at which the record was written
    pub timestamp: i64,
}

/// Result of a day-scoped lookup
#[derive(Debug, Clone, PartialEq)]
pub enum DayRead<T> {
    /// Written today and passed validation
    Hit(T),
    /// No record for the key
    Absent,
    /// Record could not be parsed; it was purged
    Corrupt,
    /// Record was written on another day; left in place
    WrongDay,
    /// Record was written today but its payload is empty; it was purged
    Empty,
}

/// Local calendar date of an epoch-millisecond timestamp
pub fn local_date(timestamp_ms: i64) -> Option<NaiveDate> {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.date_naive())
}

/// Whether an all-courts payload holds at least one menu
pub fn has_any_menu(menus: &AllMenus) -> bool {
    menus.values().any(Option::is_some)
}

/// Client cache whose entries expire at local midnight
#[derive(Debug)]
pub struct DayCache {
    store: Box<dyn DurableStore>,
    clock: Arc<dyn Clock>,
}

impl DayCache {
    pub fn new(store: impl DurableStore + 'static) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: impl DurableStore + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Box::new(store),
            clock,
        }
    }

    /// Today's local date according to this cache's clock
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&Local).date_naive()
    }

    /// Removes records older than seven days and records that don't parse
    ///
    /// Returns the number of records removed. Per-record failures are logged
    /// and skipped.
    pub fn sweep(&self) -> usize {
        let cutoff = (self.clock.now() - Duration::days(MAX_RECORD_AGE_DAYS)).timestamp_millis();

        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate client cache");
                return 0;
            }
        };

        let mut removed = 0;
        for name in keys {
            let raw = match self.store.read(&name) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %name, error = %e, "Failed to read client cache record");
                    continue;
                }
            };

            let stale = match serde_json::from_str::<DayRecord<Value>>(&raw) {
                Ok(record) => record.timestamp < cutoff,
                Err(_) => true,
            };
            if !stale {
                continue;
            }

            match self.store.remove(&name) {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %name, error = %e, "Failed to remove client cache record"),
            }
        }

        if removed > 0 {
            debug!(removed, "Swept client cache");
        }
        removed
    }

    /// Looks up `key`, trusting it only if written today and `is_valid` accepts it
    pub fn read<T: DeserializeOwned>(&self, key: &CacheKey, is_valid: impl Fn(&T) -> bool) -> DayRead<T> {
        let name = key.to_string();

        let raw = match self.store.read(&name) {
            Ok(Some(raw)) => raw,
            Ok(None) => return DayRead::Absent,
            Err(e) => {
                warn!(key = %name, error = %e, "Failed to read client cache record");
                return DayRead::Absent;
            }
        };

        let record: DayRecord<T> = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                debug!(key = %name, error = %e, "Invalid client cache record, purging");
                self.remove(key);
                return DayRead::Corrupt;
            }
        };

        let written_on = local_date(record.timestamp);
        if written_on != Some(self.today()) {
            debug!(key = %name, "Client cache record is from another day");
            return DayRead::WrongDay;
        }

        if !is_valid(&record.data) {
            debug!(key = %name, "Client cache record is empty, purging");
            self.remove(key);
            return DayRead::Empty;
        }

        debug!(key = %name, "Client cache hit");
        DayRead::Hit(record.data)
    }

    /// Today's all-courts menus for `date`, rejecting payloads with no menus
    pub fn menus(&self, date: NaiveDate) -> DayRead<AllMenus> {
        self.read(&CacheKey::all_menus(date), has_any_menu)
    }

    /// Stores `data` under `key`, stamped with the current time
    pub fn write<T: Serialize>(&self, key: &CacheKey, data: &T) {
        let record = DayRecord {
            data,
            timestamp: self.clock.now_millis(),
        };
        let name = key.to_string();
        match serde_json::to_string(&record) {
            Ok(json) => {
                if let Err(e) = self.store.write(&name, &json) {
                    warn!(key = %name, error = %e, "Failed to write client cache record");
                }
            }
            Err(e) => warn!(key = %name, error = %e, "Failed to encode client cache record"),
        }
    }

    /// Drops one record
    pub fn remove(&self, key: &CacheKey) {
        if let Err(e) = self.store.remove(&key.to_string()) {
            warn!(key = %key, error = %e, "Failed to remove client cache record");
        }
    }

    /// When the record for `key` was written, in local time
    pub fn cached_at(&self, key: &CacheKey) -> Option<DateTime<Local>> {
        let raw = self.store.read(&key.to_string()).ok()??;
        let record: DayRecord<Value> = serde_json::from_str(&raw).ok()?;
        Local.timestamp_millis_opt(record.timestamp).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::store::testing::FlakyStore;
    use crate::cache::store::FileStore;
    use crate::data::DailyMenu;
    use chrono::Utc;
    use tempfile::TempDir;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .expect("unambiguous local time")
            .with_timezone(&Utc)
    }

    fn create_test_cache(start: DateTime<Utc>) -> (DayCache, FileStore, ManualClock, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(temp_dir.path()).expect("Store should open");
        let clock = ManualClock::new(start);
        let cache = DayCache::with_clock(store.clone(), Arc::new(clock.clone()));
        (cache, store, clock, temp_dir)
    }

    fn menus_with(court: &str, menu: Option<DailyMenu>) -> AllMenus {
        let mut menus = AllMenus::new();
        menus.insert(court.to_string(), menu);
        menus
    }

    fn always(_: &String) -> bool {
        true
    }

    #[test]
    fn test_same_day_entry_is_a_hit() {
        let (cache, _store, clock, _temp_dir) = create_test_cache(local(2026, 3, 10, 8, 0));
        let key = CacheKey::nutrition("abc");
        cache.write(&key, &"eggs".to_string());

        clock.set(local(2026, 3, 10, 22, 30));

        assert_eq!(cache.read(&key, always), DayRead::Hit("eggs".to_string()));
    }

    #[test]
    fn test_entry_from_previous_day_is_stale_within_24_hours() {
        let (cache, store, clock, _temp_dir) = create_test_cache(local(2026, 3, 10, 23, 59));
        let key = CacheKey::nutrition("abc");
        cache.write(&key, &"eggs".to_string());

        clock.set(local(2026, 3, 11, 0, 1));

        assert_eq!(cache.read(&key, always), DayRead::WrongDay);
        assert!(
            store.read(&key.to_string()).unwrap().is_some(),
            "Wrong-day records are ignored, not purged"
        );
    }

    #[test]
    fn test_absent_key() {
        let (cache, _store, _clock, _temp_dir) = create_test_cache(Utc::now());
        assert_eq!(cache.read(&CacheKey::nutrition("nope"), always), DayRead::Absent);
    }

    #[test]
    fn test_unparseable_record_is_purged() {
        let (cache, store, _clock, _temp_dir) = create_test_cache(Utc::now());
        let key = CacheKey::nutrition("abc");
        store.write(&key.to_string(), "not json at all").unwrap();

        assert_eq!(cache.read(&key, always), DayRead::Corrupt);
        assert!(store.read(&key.to_string()).unwrap().is_none());
    }

    #[test]
    fn test_all_null_menus_are_rejected_and_purged() {
        let (cache, store, _clock, _temp_dir) = create_test_cache(local(2026, 3, 10, 12, 0));
        let date = cache.today();
        let key = CacheKey::all_menus(date);
        let mut menus = menus_with("Ford", None);
        menus.insert("Wiley".to_string(), None);
        cache.write(&key, &menus);

        assert_eq!(cache.menus(date), DayRead::Empty);
        assert!(store.read(&key.to_string()).unwrap().is_none());
    }

    #[test]
    fn test_menus_with_one_court_present_are_a_hit() {
        let (cache, _store, _clock, _temp_dir) = create_test_cache(local(2026, 3, 10, 12, 0));
        let date = cache.today();
        let mut menus = menus_with("Ford", None);
        menus.insert("Wiley".to_string(), Some(DailyMenu::default()));
        cache.write(&CacheKey::all_menus(date), &menus);

        assert_eq!(cache.menus(date), DayRead::Hit(menus));
    }

    #[test]
    fn test_sweep_removes_old_and_corrupt_records_only() {
        let (cache, store, clock, _temp_dir) = create_test_cache(local(2026, 3, 1, 12, 0));
        cache.write(&CacheKey::nutrition("ancient"), &1);

        clock.set(local(2026, 3, 7, 12, 0));
        cache.write(&CacheKey::nutrition("recent"), &2);
        store.write("scratch", "{\"timestamp\": \"soon\"}").unwrap();

        clock.set(local(2026, 3, 9, 12, 0));
        let removed = cache.sweep();

        assert_eq!(removed, 2);
        assert_eq!(store.keys().unwrap(), vec!["nutrition_recent".to_string()]);
        assert_eq!(cache.sweep(), 0);
    }

    fn seed_old_records(cache: &DayCache, store: &FileStore, clock: &ManualClock) {
        for id in ["a", "b", "c"] {
            cache.write(&CacheKey::nutrition(id), &0);
        }
        clock.set(local(2026, 3, 9, 12, 0));
        cache.write(&CacheKey::nutrition("recent"), &1);
        store.write("scratch", "not json").unwrap();
    }

    #[test]
    fn test_sweep_continues_past_unreadable_record() {
        let (seed, store, clock, _temp_dir) = create_test_cache(local(2026, 3, 1, 12, 0));
        seed_old_records(&seed, &store, &clock);
        let cache = DayCache::with_clock(
            FlakyStore::unreadable(store.clone(), "nutrition_a"),
            Arc::new(clock.clone()),
        );

        assert_eq!(cache.sweep(), 3);
        assert_eq!(
            store.keys().unwrap(),
            vec!["nutrition_a".to_string(), "nutrition_recent".to_string()]
        );
    }

    #[test]
    fn test_sweep_continues_past_undeletable_record() {
        let (seed, store, clock, _temp_dir) = create_test_cache(local(2026, 3, 1, 12, 0));
        seed_old_records(&seed, &store, &clock);
        let cache = DayCache::with_clock(
            FlakyStore::undeletable(store.clone(), "nutrition_b"),
            Arc::new(clock.clone()),
        );

        assert_eq!(cache.sweep(), 3);
        assert_eq!(
            store.keys().unwrap(),
            vec!["nutrition_b".to_string(), "nutrition_recent".to_string()]
        );
    }

    #[test]
    fn test_cached_at_and_remove() {
        let start = local(2026, 3, 10, 9, 15);
        let (cache, _store, _clock, _temp_dir) = create_test_cache(start);
        let key = CacheKey::all_menus(cache.today());
        cache.write(&key, &menus_with("Ford", Some(DailyMenu::default())));

        assert_eq!(cache.cached_at(&key), Some(start.with_timezone(&Local)));

        cache.remove(&key);
        assert!(cache.cached_at(&key).is_none());
    }
}
