//! Storage Engine Adapter
//!
//! Narrows the embedded [`Engine`] to what the document index needs: atomic
//! multi-key transactions, posting-list appends through the engine's merge
//! operator, point reads and an explicit durability flush. Engine errors are
//! translated into the index's error taxonomy here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::document::POSTING_DELIMITER;
use crate::engine::Engine;
use crate::error::{IndexError, Result};
use crate::wal::Operation;

/// One write inside a [`KvStore::transact`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl Mutation {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Mutation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Mutation::Delete { key: key.into() }
    }
}

impl From<Mutation> for Operation {
    fn from(mutation: Mutation) -> Self {
        match mutation {
            Mutation::Put { key, value } => Operation::Put { key, value },
            Mutation::Delete { key } => Operation::Delete { key },
        }
    }
}

/// Merge operator for posting lists: `existing ":" operand`
///
/// An absent or empty value becomes the operand alone, so lists never start
/// with a delimiter.
pub fn append_posting(_key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> Vec<u8> {
    match existing {
        Some(current) if !current.is_empty() => {
            let mut merged = Vec::with_capacity(current.len() + 1 + operand.len());
            merged.extend_from_slice(current);
            merged.push(POSTING_DELIMITER);
            merged.extend_from_slice(operand);
            merged
        }
        _ => operand.to_vec(),
    }
}

/// Handle on the embedded engine, shared by ingestion and queries
pub struct KvStore {
    engine: Engine,
    location: PathBuf,
}

impl KvStore {
    /// Open the engine at `config.data_dir` with the posting-list merge
    /// operator registered
    pub fn open(config: &Config) -> Result<Self> {
        let location = config.data_dir.clone();
        let engine = Engine::open_with_merge_operator(config.clone(), append_posting).map_err(
            |e| IndexError::StorageOpen {
                path: location.display().to_string(),
                reason: e.to_string(),
            },
        )?;

        Ok(Self { engine, location })
    }

    /// Flush buffered state to disk; the handle stays usable
    pub fn close(&self) -> Result<()> {
        self.engine
            .shutdown()
            .map_err(|e| IndexError::Flush(e.to_string()))
    }

    /// Apply all mutations atomically
    pub fn transact(&self, mutations: Vec<Mutation>) -> Result<()> {
        let operations = mutations.into_iter().map(Operation::from).collect();
        self.engine
            .write_batch(operations)
            .map_err(|e| IndexError::StorageWrite(e.to_string()))
    }

    /// Append `fragment` to the posting list at `key`, creating it if absent
    pub fn merge_append(&self, key: &[u8], fragment: &[u8], timeout: Duration) -> Result<()> {
        self.engine
            .merge(key, fragment, timeout)
            .map_err(|e| IndexError::Merge {
                token: String::from_utf8_lossy(key).into_owned(),
                reason: e.to_string(),
            })
    }

    /// Point read
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.engine
            .get(key)
            .map_err(|e| IndexError::Lookup(e.to_string()))
    }

    /// Live entries under `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.engine
            .scan_prefix(prefix)
            .map_err(|e| IndexError::Lookup(e.to_string()))
    }

    /// Make every write so far durable
    pub fn sync(&self) -> Result<()> {
        self.engine
            .sync()
            .map_err(|e| IndexError::Flush(e.to_string()))
    }

    /// Directory the engine lives in
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Underlying engine, for inspection
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}
