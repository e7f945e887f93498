//! Per-tenant statistics file, serialized with an advisory exclusive lock

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error};

use super::{Result, StoreError};
use crate::models::{StatKind, StatisticsRecord};

const STATS_FILE: &str = "statistics.json";

/// Retry policy for acquiring the exclusive lock on the statistics file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            attempts: 20,
            interval: Duration::from_millis(50),
        }
    }
}

/// Owns `{root}/statistics.json`.
#[derive(Debug, Clone)]
pub struct StatsStore {
    path: PathBuf,
    policy: LockPolicy,
}

impl StatsStore {
    pub fn new(root: &Path, policy: LockPolicy) -> Self {
        Self {
            path: root.join(STATS_FILE),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-modify-write the record under an exclusive lock.
    ///
    /// Blocks the calling thread while retrying; call from a blocking context.
    pub fn increment(&self, kind: StatKind) -> Result<StatisticsRecord> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = self.lock_exclusive()?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let mut stats = self.parse(&content)?;

        stats.register(kind);

        let json = serde_json::to_string_pretty(&stats).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(json.as_bytes())?;
        file.sync_data()?;

        // lock released when `file` drops
        Ok(stats)
    }

    /// Current record under a shared lock; a missing or empty file reads as all zero.
    ///
    /// Waits out a concurrent `increment` instead of observing its truncated file.
    pub fn read(&self) -> Result<StatisticsRecord> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StatisticsRecord::new()),
            Err(e) => return Err(e.into()),
        };
        self.acquire(&file, "shared", |f| FileExt::try_lock_shared(f))?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        self.parse(&content)
    }

    fn parse(&self, content: &str) -> Result<StatisticsRecord> {
        if content.trim().is_empty() {
            return Ok(StatisticsRecord::new());
        }
        serde_json::from_str(content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn lock_exclusive(&self) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        self.acquire(&file, "exclusive", |f| FileExt::try_lock_exclusive(f))?;
        Ok(file)
    }

    /// Retry `try_lock` per the lock policy.
    fn acquire<F>(&self, file: &File, mode: &str, try_lock: F) -> Result<()>
    where
        F: Fn(&File) -> std::io::Result<()>,
    {
        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            match try_lock(file) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    debug!(attempt, mode, error = %e, path = %self.path.display(), "Stats file busy, retrying");
                    std::thread::sleep(self.policy.interval);
                }
                Err(e) => {
                    error!(attempts, mode, error = %e, path = %self.path.display(), "Stats file lock exhausted");
                }
            }
        }

        Err(StoreError::LockExhausted {
            path: self.path.clone(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = StatsStore::new(dir.path(), LockPolicy::default());
        let stats = store.read().unwrap();
        assert!(stats.counts.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_increment_persists() {
        let dir = TempDir::new().unwrap();
        let store = StatsStore::new(dir.path(), LockPolicy::default());

        store.increment(StatKind::ConfigSaved).unwrap();
        store.increment(StatKind::ConfigSaved).unwrap();
        store.increment(StatKind::LogsViewed).unwrap();

        let stats = store.read().unwrap();
        assert_eq!(stats.count(StatKind::ConfigSaved), 2);
        assert_eq!(stats.count(StatKind::LogsViewed), 1);
        assert!(stats.update_timestamp >= stats.creation_timestamp);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let root = Arc::new(dir.path().to_path_buf());
        let policy = LockPolicy {
            attempts: 500,
            interval: Duration::from_millis(2),
        };

        let thread_count = 16;
        let mut handles = vec![];
        for _ in 0..thread_count {
            let root = root.clone();
            handles.push(thread::spawn(move || {
                // each thread opens its own store to mimic independent callers
                let store = StatsStore::new(&root, policy);
                store.increment(StatKind::ApiInvoked).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let store = StatsStore::new(&root, policy);
        assert_eq!(store.read().unwrap().count(StatKind::ApiInvoked), thread_count);
    }

    #[test]
    fn test_read_during_increments_never_goes_backwards() {
        let dir = TempDir::new().unwrap();
        let policy = LockPolicy {
            attempts: 1000,
            interval: Duration::from_millis(1),
        };
        let store = StatsStore::new(dir.path(), policy);
        for _ in 0..5 {
            store.increment(StatKind::ApiInvoked).unwrap();
        }

        let writer_store = store.clone();
        let writer = thread::spawn(move || {
            for _ in 0..200 {
                writer_store.increment(StatKind::ApiInvoked).unwrap();
            }
        });

        let mut last = 5;
        for _ in 0..2000 {
            let seen = store.read().unwrap().count(StatKind::ApiInvoked);
            assert!(seen >= last, "counter went from {} to {}", last, seen);
            last = seen;
        }
        writer.join().unwrap();

        assert_eq!(store.read().unwrap().count(StatKind::ApiInvoked), 205);
    }

    #[test]
    fn test_read_waits_for_exclusive_holder() {
        let dir = TempDir::new().unwrap();
        let policy = LockPolicy {
            attempts: 2,
            interval: Duration::from_millis(1),
        };
        let store = StatsStore::new(dir.path(), policy);
        store.increment(StatKind::ConfigRead).unwrap();

        let holder = OpenOptions::new().write(true).open(store.path()).unwrap();
        FileExt::lock_exclusive(&holder).unwrap();
        assert!(matches!(store.read(), Err(StoreError::LockExhausted { attempts: 2, .. })));

        drop(holder);
        assert_eq!(store.read().unwrap().count(StatKind::ConfigRead), 1);
    }

    #[test]
    fn test_lock_exhaustion() {
        let dir = TempDir::new().unwrap();
        let policy = LockPolicy {
            attempts: 3,
            interval: Duration::from_millis(1),
        };
        let store = StatsStore::new(dir.path(), policy);

        let holder = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(store.path())
            .unwrap();
        FileExt::lock_exclusive(&holder).unwrap();

        let err = store.increment(StatKind::ApiInvoked).unwrap_err();
        assert!(matches!(err, StoreError::LockExhausted { attempts: 3, .. }));

        drop(holder);
        store.increment(StatKind::ApiInvoked).unwrap();
        assert_eq!(store.read().unwrap().count(StatKind::ApiInvoked), 1);
    }

    #[test]
    fn test_corrupt_stats_file() {
        let dir = TempDir::new().unwrap();
        let store = StatsStore::new(dir.path(), LockPolicy::default());
        fs::write(store.path(), "[]").unwrap();
        assert!(matches!(store.read(), Err(StoreError::Corrupt { .. })));
    }
}
