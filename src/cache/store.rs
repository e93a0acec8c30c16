//! Durable storage adapter
//!
//! A `DurableStore` holds one opaque text record per key. Records are
//! individually addressable so that a single corrupted record can be dropped
//! without touching the others. Record (de)serialization is the caller's job.

use std::borrow::Cow;
use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::warn;

/// File extension for stored records
const RECORD_EXTENSION: &str = "json";

/// Suffix for in-progress writes, renamed into place once complete
const TEMP_SUFFIX: &str = ".tmp";

/// Temp files untouched for this long are leftovers of interrupted writes
const STALE_TEMP_AGE: Duration = Duration::from_secs(60);

/// Errors raised by a durable store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading, writing, or deleting a single record failed
    #[error("storage I/O failed for record '{key}': {source}")]
    Record {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The storage area itself could not be created, listed, or emptied
    #[error("storage area {path} is unavailable: {source}")]
    Area {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One-record-per-key persistent storage
pub trait DurableStore: Send + Sync + Debug {
    /// Returns the raw record for `key`, or `None` if there is none
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replaces the record for `key`
    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError>;

    /// Deletes the record for `key`. Deleting a missing record succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Lists the keys of every stored record
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Deletes every record
    fn clear(&self) -> Result<(), StoreError>;

    /// Deletes leftovers of interrupted writes, returning how many were removed
    fn purge_incomplete(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Stores each record as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { dir: dir.into() };
        store.ensure_dir()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Area {
            path: self.dir.clone(),
            source,
        })
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", encode_file_stem(key), RECORD_EXTENSION))
    }

    fn record_error(key: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::Record {
            key: key.to_string(),
            source,
        }
    }
}

impl DurableStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.record_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::record_error(key)(e)),
        }
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
        self.ensure_dir()?;

        let path = self.record_path(key);
        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);

        fs::write(&temp, contents).map_err(Self::record_error(key))?;
        fs::rename(&temp, &path).map_err(Self::record_error(key))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::record_error(key)(e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Area {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(decode_file_stem)
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StoreError::Area {
                    path: self.dir.clone(),
                    source,
                })
            }
        }
        self.ensure_dir()
    }

    fn purge_incomplete(&self) -> Result<usize, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(StoreError::Area {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_temp = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(TEMP_SUFFIX));
            if !is_temp {
                continue;
            }

            // Leave writes that may still be in progress alone
            let age = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.map_or(true, |age| age < STALE_TEMP_AGE) {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove leftover temp file"),
            }
        }
        Ok(removed)
    }
}

/// Percent-encodes a key so it is a safe file name
fn encode_file_stem(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

fn decode_file_stem(stem: &str) -> Option<String> {
    urlencoding::decode(stem).ok().map(Cow::into_owned)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A file store that fails reads or removals of one named record
    #[derive(Debug, Clone)]
    pub(crate) struct FlakyStore {
        inner: FileStore,
        unreadable: Option<String>,
        undeletable: Option<String>,
    }

    impl FlakyStore {
        pub(crate) fn unreadable(inner: FileStore, key: &str) -> Self {
            Self {
                inner,
                unreadable: Some(key.to_string()),
                undeletable: None,
            }
        }

        pub(crate) fn undeletable(inner: FileStore, key: &str) -> Self {
            Self {
                inner,
                unreadable: None,
                undeletable: Some(key.to_string()),
            }
        }

        fn failure(key: &str) -> StoreError {
            StoreError::Record {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "flaky"),
            }
        }
    }

    impl DurableStore for FlakyStore {
        fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
            if self.unreadable.as_deref() == Some(key) {
                return Err(Self::failure(key));
            }
            self.inner.read(key)
        }

        fn write(&self, key: &str, contents: &str) -> Result<(), StoreError> {
            self.inner.write(key, contents)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            if self.undeletable.as_deref() == Some(key) {
                return Err(Self::failure(key));
            }
            self.inner.remove(key)
        }

        fn keys(&self) -> Result<Vec<String>, StoreError> {
            self.inner.keys()
        }

        fn clear(&self) -> Result<(), StoreError> {
            self.inner.clear()
        }
    }
}
