//! Cache module for menu and nutrition data
//!
//! The server-side cache is a two-tier `CacheManager`: an in-memory map in front
//! of a `DurableStore` holding one JSON record per key, each with its own expiry.
//! `ReadThrough` wraps it so every miss becomes exactly one upstream fetch even
//! under concurrent callers. `DayCache` is the client-side variant whose entries
//! are only trusted on the calendar day they were written.

mod clock;
mod day;
mod key;
mod manager;
mod read_through;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use day::{has_any_menu, local_date, DayCache, DayRead, DayRecord, MAX_RECORD_AGE_DAYS};
pub use key::CacheKey;
pub use manager::{CacheManager, CacheRecord, SweepStats, DEFAULT_TTL};
pub use read_through::ReadThrough;
pub use store::{DurableStore, FileStore, StoreError};
