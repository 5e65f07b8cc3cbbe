//! Storage Module
//!
//! Persistent storage layer of immutable, sorted SSTable files.
//!
//! ## Responsibilities
//! - Persist flushed MemTables to disk in sorted format
//! - Point lookups through an in-memory key index per table
//! - Prefix scans merged across tables (newest version wins)
//!
//! See [`sstable`] for the on-disk file format.

pub mod sstable;
mod manager;

pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
pub use manager::StorageManager;
