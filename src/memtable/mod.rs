//! MemTable
//!
//! Sorted in-memory buffer of writes not yet flushed to an SSTable. Deletes
//! are kept as tombstones so they can shadow older values on disk.

mod table;

pub use table::MemTable;

/// A key's latest state in the memtable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemTableEntry {
    Value(Vec<u8>),
    Tombstone,
}

impl MemTableEntry {
    /// Bytes counted toward the flush threshold, excluding the key
    pub(crate) fn value_len(&self) -> usize {
        match self {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        }
    }
}
