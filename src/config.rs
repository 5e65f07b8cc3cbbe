//! Configuration for jupiter-index
//!
//! Centralized configuration with sensible defaults. A `Config` can be built
//! in code through [`ConfigBuilder`] or read from any key-value source with
//! [`Config::from_pairs`].

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IndexError, Result};

/// Main configuration for an index instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (WAL, SSTables)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     └── sstables/        (SSTable files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// WAL size (in bytes) that forces a memtable flush and log truncation
    pub wal_size_limit: u64,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Ingestion Configuration
    // -------------------------------------------------------------------------
    /// Max ingestions allowed to run at the same time
    pub max_concurrent_ingests: usize,

    /// Longest a single posting-list merge may spend combining its value
    /// (milliseconds). Time spent queued behind other writers is not counted.
    pub merge_timeout_ms: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./jupiter_data"),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            wal_size_limit: 64 * 1024 * 1024,      // 64 MB
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            max_concurrent_ingests: 100,
            merge_timeout_ms: 100,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Build a config from `(key, value)` pairs, starting from the defaults.
    ///
    /// Recognized keys: `datadir`, `max_concurrent_ingests`,
    /// `merge_timeout_ms`, `memtable_size_limit`, `wal_size_limit`,
    /// `wal_sync_every` (`1` means every write). Unknown keys are ignored so the index can
    /// share a configuration source with the rest of the process.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Config::default();

        for (key, value) in pairs {
            let value = value.as_ref().trim();
            match key.as_ref() {
                "datadir" => config.data_dir = PathBuf::from(value),
                "max_concurrent_ingests" => {
                    config.max_concurrent_ingests = parse_number(key.as_ref(), value)?
                }
                "merge_timeout_ms" => config.merge_timeout_ms = parse_number(key.as_ref(), value)?,
                "memtable_size_limit" => {
                    config.memtable_size_limit = parse_number(key.as_ref(), value)?
                }
                "wal_size_limit" => config.wal_size_limit = parse_number(key.as_ref(), value)?,
                "wal_sync_every" => {
                    let count: usize = parse_number(key.as_ref(), value)?;
                    config.wal_sync_strategy = if count <= 1 {
                        WalSyncStrategy::EveryWrite
                    } else {
                        WalSyncStrategy::EveryNEntries { count }
                    };
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the index cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(IndexError::Config("datadir must not be empty".to_string()));
        }
        if self.max_concurrent_ingests == 0 {
            return Err(IndexError::Config(
                "max_concurrent_ingests must be a positive integer".to_string(),
            ));
        }
        if self.wal_size_limit == 0 {
            return Err(IndexError::Config(
                "wal_size_limit must be a positive number of bytes".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(IndexError::Config(
                "WAL sync interval must be at least one entry".to_string(),
            ));
        }
        Ok(())
    }

    /// Merge timeout as a `Duration`
    pub fn merge_timeout(&self) -> Duration {
        Duration::from_millis(self.merge_timeout_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| IndexError::Config(format!("{} expects a number, got {:?}", key, value)))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the WAL size that triggers a flush (in bytes)
    pub fn wal_size_limit(mut self, size: u64) -> Self {
        self.config.wal_size_limit = size;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the maximum number of concurrent ingestions
    pub fn max_concurrent_ingests(mut self, count: usize) -> Self {
        self.config.max_concurrent_ingests = count;
        self
    }

    /// Set the posting-list merge timeout (in milliseconds)
    pub fn merge_timeout_ms(mut self, ms: u64) -> Self {
        self.config.merge_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
