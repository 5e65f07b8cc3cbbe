//! Embedded key-value engine
//!
//! Writes go to the WAL, then the memtable; a full memtable becomes an
//! SSTable. On top of plain puts and deletes the engine offers atomic
//! batches, operator-driven merges and prefix scans, which is everything the
//! document index asks of its storage.
//!
//! A merge logs only its operand. Replaying such a record folds the operand
//! into whatever value is current at that point, so an engine whose WAL holds
//! merges can only be opened with the same operator registered.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::StorageManager;
use crate::wal::{Operation, WalRecovery, WalWriter};

/// Combines the stored value of `key` (if any) with a new operand.
///
/// Runs while the writer lock is held, so it must not call back into the
/// engine. It must be deterministic: WAL replay calls it again.
pub type MergeOperator = fn(key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> Vec<u8>;

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/batch/merge/flush): serialized by `write_lock`
///   - Must acquire: write_lock → WAL → memtable → storage (write)
///   - `merge` queues like any writer; its timeout covers only its own work
///
/// - **Reads** (get): no write_lock
///   - MemTable and StorageManager both use internal RwLocks
///   - A flush publishes the new SSTable before clearing the MemTable, so a
///     concurrent read always finds the key in one of the two
pub struct Engine {
    config: Config,

    /// Directory for SSTables
    storage_dir: PathBuf,

    wal: Mutex<WalWriter>,

    memtable: MemTable,

    storage: StorageManager,

    /// Serializes write operations
    write_lock: Mutex<()>,

    merge_operator: Option<MergeOperator>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Load existing SSTables
    /// 3. Replay the WAL into the MemTable
    /// 4. Flush recovered entries and truncate the WAL
    ///
    /// Fails if the WAL holds merge records; use
    /// [`Engine::open_with_merge_operator`] for those.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_inner(config, None)
    }

    /// Open with `operator` registered for [`Engine::merge`] and for
    /// replaying logged merges
    pub fn open_with_merge_operator(config: Config, operator: MergeOperator) -> Result<Self> {
        Self::open_inner(config, Some(operator))
    }

    fn open_inner(config: Config, merge_operator: Option<MergeOperator>) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        let storage = StorageManager::open(&storage_dir)?;
        let memtable = MemTable::new();

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    recovered = recovery.entries_recovered,
                    corrupted = recovery.entries_corrupted,
                    last_lsn = recovery.last_lsn,
                    "WAL recovery"
                );
            }

            for entry in entries {
                Self::apply(&memtable, &storage, merge_operator, entry.operation)?;
            }

            // Recovered data must reach an SSTable before the WAL is cut
            if !memtable.is_empty() {
                tracing::info!(
                    entries = memtable.entry_count(),
                    "Flushing recovered entries to SSTable"
                );
                storage.flush(&memtable)?;
                memtable.clear();
            }
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
        wal.truncate()?;

        Ok(Self {
            config,
            storage_dir,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
            merge_operator,
        })
    }

    /// Default settings, data under `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Point read: memtable first, then SSTables newest to oldest
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Self::read_latest(&self.memtable, &self.storage, key)
    }

    fn read_latest(
        memtable: &MemTable,
        storage: &StorageManager,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = memtable.get(key) {
            return match entry {
                MemTableEntry::Value(value) => Ok(Some(value)),
                MemTableEntry::Tombstone => Ok(None),
            };
        }

        storage.get(key)
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.commit(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.commit(Operation::Delete { key: key.to_vec() })
    }

    /// Apply several operations atomically
    ///
    /// The batch is one WAL frame: after a crash it is replayed whole or not
    /// at all.
    pub fn write_batch(&self, operations: Vec<Operation>) -> Result<()> {
        if operations.is_empty() {
            return Ok(());
        }

        let batch = Operation::Batch(operations);
        if self.merge_operator.is_none() && contains_merge(&batch) {
            return Err(missing_operator());
        }

        let _write_guard = self.write_lock.lock();
        self.commit(batch)
    }

    /// Combine `operand` into the value at `key` with the merge operator
    ///
    /// Queues for the writer lock like any other write. Once it holds the
    /// lock, reading the current value and running the operator must finish
    /// within `timeout`, otherwise nothing is written and `MergeTimeout` is
    /// returned. Only `operand` goes to the WAL.
    pub fn merge(&self, key: &[u8], operand: &[u8], timeout: Duration) -> Result<()> {
        let operator = self.merge_operator.ok_or_else(missing_operator)?;

        let _write_guard = self.write_lock.lock();

        let started = Instant::now();
        let existing = self.get(key)?;
        let merged = operator(key, existing.as_deref(), operand);

        if started.elapsed() > timeout {
            return Err(IndexError::MergeTimeout {
                key: String::from_utf8_lossy(key).into_owned(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let wal_size = self.log(Operation::Merge {
            key: key.to_vec(),
            operand: operand.to_vec(),
        })?;
        self.memtable.put(key.to_vec(), merged);

        self.flush_if_needed(wal_size)
    }

    /// Live entries whose key starts with `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        // Keeps a flush from moving entries between the two scans
        let _write_guard = self.write_lock.lock();

        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = self.storage.scan_prefix(prefix)?;
        for (key, entry) in self.memtable.scan_prefix(prefix) {
            let value = match entry {
                MemTableEntry::Value(v) => Some(v),
                MemTableEntry::Tombstone => None,
            };
            merged.insert(key, value);
        }

        Ok(merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    /// fsync the WAL so every committed write survives a crash
    pub fn sync(&self) -> Result<()> {
        self.wal.lock().sync()
    }

    /// Write the memtable out as an SSTable regardless of its size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Flush the memtable and sync the WAL without giving up the engine
    pub fn shutdown(&self) -> Result<()> {
        self.flush()?;
        self.sync()
    }

    /// Close the engine gracefully
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    // =========================================================================
    // Write Path (caller holds write_lock)
    // =========================================================================

    fn commit(&self, operation: Operation) -> Result<()> {
        // WAL first (durability guarantee)
        let wal_size = self.log(operation.clone())?;

        Self::apply(&self.memtable, &self.storage, self.merge_operator, operation)?;

        self.flush_if_needed(wal_size)
    }

    /// Append to the WAL, returning its size afterwards
    fn log(&self, operation: Operation) -> Result<u64> {
        let mut wal = self.wal.lock();
        wal.append(operation)?;
        Ok(wal.size())
    }

    /// Flush when the memtable is full or the WAL has grown past its limit
    fn flush_if_needed(&self, wal_size: u64) -> Result<()> {
        if self.memtable.should_flush(self.config.memtable_size_limit)
            || wal_size >= self.config.wal_size_limit
        {
            self.flush_internal()?;
        }
        Ok(())
    }

    /// Apply one logged operation to the memtable, live or during replay
    fn apply(
        memtable: &MemTable,
        storage: &StorageManager,
        merge_operator: Option<MergeOperator>,
        operation: Operation,
    ) -> Result<()> {
        match operation {
            Operation::Put { key, value } => {
                memtable.put(key, value);
            }
            Operation::Delete { key } => {
                memtable.delete(key);
            }
            Operation::Merge { key, operand } => {
                let operator = merge_operator.ok_or_else(missing_operator)?;
                let existing = Self::read_latest(memtable, storage, &key)?;
                let merged = operator(&key, existing.as_deref(), &operand);
                memtable.put(key, merged);
            }
            Operation::Batch(ops) => {
                for op in ops {
                    Self::apply(memtable, storage, merge_operator, op)?;
                }
            }
        }
        Ok(())
    }

    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        self.storage.flush(&self.memtable)?;
        self.memtable.clear();

        // Entries are now durable in the SSTable
        self.wal.lock().truncate()?;

        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Where SSTables live
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Bytes currently in the WAL
    pub fn wal_size(&self) -> u64 {
        self.wal.lock().size()
    }

    /// Approximate bytes buffered in the memtable
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn missing_operator() -> IndexError {
    IndexError::Storage("merge requested without a registered merge operator".to_string())
}

fn contains_merge(operation: &Operation) -> bool {
    match operation {
        Operation::Merge { .. } => true,
        Operation::Batch(ops) => ops.iter().any(contains_merge),
        Operation::Put { .. } | Operation::Delete { .. } => false,
    }
}
