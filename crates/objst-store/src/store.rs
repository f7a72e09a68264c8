//! Key-value store backed by redb.
//!
//! Provides point get/set/delete, full-store scans, single-store write
//! batches and online compaction. Every write is its own redb write
//! transaction (write txn + commit); a [`WriteBatch`] groups several writes
//! into one.
//!
//! Compaction needs the database exclusively, so the handle sits behind an
//! `RwLock`: regular operations share it, `compact` takes it alone. An
//! operation that cannot get in within the busy timeout fails with
//! [`StoreError::Unavailable`] instead of waiting for the compaction.

use crate::error::{StoreError, StoreResult};
use crate::tables::{DATA_FILE, ENTRIES};
use objst_common::StoreConfig;
use parking_lot::{RwLock, RwLockReadGuard};
use redb::{Database, ReadableTable, ReadableTableMetadata};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Options for opening a store
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Page cache size
    pub cache_size_bytes: usize,
    /// Maximum wait for a store that is being compacted
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            cache_size_bytes: config.cache_size_bytes,
            busy_timeout: config.busy_timeout(),
        }
    }
}

/// Result of a compaction request
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompactionOutcome {
    /// The file was rewritten
    Compacted {
        /// Share of the file that was reclaimable before compaction
        ratio: f64,
    },
    /// Compaction ran but found nothing to reclaim
    NothingToReclaim,
    /// Reclaimable share is below the requested threshold
    Skipped {
        /// Share of the file that is reclaimable
        ratio: f64,
    },
    /// The store stayed busy for the whole busy timeout
    Busy,
}

/// Key-value store over a single redb database
pub struct KvStore {
    db: RwLock<Database>,
    dir: PathBuf,
    busy_timeout: Duration,
}

impl KvStore {
    /// Open (or create) the store in `dir`.
    pub fn open(dir: impl AsRef<Path>, options: &StoreOptions) -> StoreResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let db = Database::builder()
            .set_cache_size(options.cache_size_bytes)
            .create(dir.join(DATA_FILE))?;

        // Create the table eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(ENTRIES)?;
        }
        write_txn.commit()?;

        info!("Opened store at {:?}", dir);
        Ok(Self {
            db: RwLock::new(db),
            dir: dir.to_path_buf(),
            busy_timeout: options.busy_timeout,
        })
    }

    /// Directory this store lives in
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let db = self.shared()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    /// Check if a key exists
    pub fn contains(&self, key: &str) -> StoreResult<bool> {
        let db = self.shared()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        Ok(table.get(key)?.is_some())
    }

    /// Insert or overwrite a key
    pub fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let db = self.shared()?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        debug!("set {} ({} bytes) in {:?}", key, value.len(), self.dir);
        Ok(())
    }

    /// Remove a key. Returns whether it existed.
    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        let db = self.shared()?;
        let write_txn = db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(ENTRIES)?;
            let removed = table.remove(key)?;
            removed.is_some()
        };
        write_txn.commit()?;
        debug!("delete {} (existed: {}) in {:?}", key, existed, self.dir);
        Ok(existed)
    }

    /// Number of entries
    pub fn len(&self) -> StoreResult<u64> {
        let db = self.shared()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        Ok(table.len()?)
    }

    /// Check if the store holds no entries
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Visit every entry in key order within one read transaction.
    ///
    /// The first error returned by `visit` stops the scan and is returned
    /// as is.
    pub fn scan<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(&str, &[u8]) -> Result<(), E>,
    {
        let db = self.shared()?;
        let read_txn = db.begin_read().map_err(StoreError::from)?;
        let table = read_txn.open_table(ENTRIES).map_err(StoreError::from)?;
        for entry in table.iter().map_err(StoreError::from)? {
            let (key, value) = entry.map_err(StoreError::from)?;
            visit(key.value(), value.value())?;
        }
        Ok(())
    }

    /// Snapshot of all keys
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        self.scan(|key, _| -> StoreResult<()> {
            keys.push(key.to_string());
            Ok(())
        })?;
        Ok(keys)
    }

    /// Start a batch of writes applied atomically on commit
    #[must_use]
    pub const fn write_batch(&self) -> WriteBatch<'_> {
        WriteBatch {
            store: self,
            ops: Vec::new(),
        }
    }

    /// Reclaim free space when at least `threshold` of the file is
    /// reclaimable (0.0 forces a compaction).
    #[allow(clippy::cast_precision_loss)]
    pub fn compact(&self, threshold: f64) -> StoreResult<CompactionOutcome> {
        let Some(mut db) = self.db.try_write_for(self.busy_timeout) else {
            return Ok(CompactionOutcome::Busy);
        };

        let ratio = {
            let txn = db.begin_write()?;
            let stats = txn.stats()?;
            txn.abort()?;
            let allocated = stats.allocated_pages() * stats.page_size() as u64;
            if allocated == 0 {
                0.0
            } else {
                stats.fragmented_bytes() as f64 / allocated as f64
            }
        };

        if ratio < threshold {
            debug!(
                "Skipping compaction of {:?}: ratio {:.3} < {:.3}",
                self.dir, ratio, threshold
            );
            return Ok(CompactionOutcome::Skipped { ratio });
        }

        if db.compact()? {
            info!("Compacted {:?} (reclaimable ratio {:.3})", self.dir, ratio);
            Ok(CompactionOutcome::Compacted { ratio })
        } else {
            Ok(CompactionOutcome::NothingToReclaim)
        }
    }

    /// Close the store, releasing the database file
    pub fn close(self) {
        info!("Closed store at {:?}", self.dir);
    }

    fn shared(&self) -> StoreResult<RwLockReadGuard<'_, Database>> {
        self.db.try_read_for(self.busy_timeout).ok_or_else(|| {
            StoreError::Unavailable(format!(
                "store {} busy for more than {:?}",
                self.dir.display(),
                self.busy_timeout
            ))
        })
    }
}

/// Exclusive hold on a store, released on drop
#[cfg(any(test, feature = "testutil"))]
pub struct StoreHold<'a> {
    _guard: parking_lot::RwLockWriteGuard<'a, Database>,
}

#[cfg(any(test, feature = "testutil"))]
impl KvStore {
    /// Take the store the way a running compaction does. Every other
    /// operation fails with [`StoreError::Unavailable`] until the hold is
    /// dropped.
    #[must_use]
    pub fn hold_exclusive(&self) -> StoreHold<'_> {
        StoreHold {
            _guard: self.db.write(),
        }
    }
}

enum BatchOp {
    Put(String, Vec<u8>),
    Delete(String),
}

/// Buffered writes against one store, applied in a single transaction.
///
/// Dropping a batch without calling [`WriteBatch::commit`] discards it.
pub struct WriteBatch<'a> {
    store: &'a KvStore,
    ops: Vec<BatchOp>,
}

impl WriteBatch<'_> {
    /// Queue an insert
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key.into(), value));
    }

    /// Queue a delete
    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(BatchOp::Delete(key.into()));
    }

    /// Number of queued operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply all queued operations atomically
    pub fn commit(self) -> StoreResult<()> {
        if self.ops.is_empty() {
            return Ok(());
        }
        let db = self.store.shared()?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            for op in &self.ops {
                match op {
                    BatchOp::Put(key, value) => {
                        table.insert(key.as_str(), value.as_slice())?;
                    }
                    BatchOp::Delete(key) => {
                        table.remove(key.as_str())?;
                    }
                }
            }
        }
        write_txn.commit()?;
        debug!(
            "write batch: {} ops committed to {:?}",
            self.ops.len(),
            self.store.dir
        );
        Ok(())
    }
}
