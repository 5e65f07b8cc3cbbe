//! Error types for jupiter-index
//!
//! One error type covers the embedded engine and the document index built
//! on top of it.

use thiserror::Error;

/// Result type alias using IndexError
pub type Result<T> = std::result::Result<T, IndexError>;

/// Unified error type for jupiter-index operations
#[derive(Debug, Error)]
pub enum IndexError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key not found")]
    KeyNotFound,

    #[error("Merge on key {key:?} took longer than {timeout_ms}ms")]
    MergeTimeout { key: String, timeout_ms: u64 },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Ingestion Errors
    // -------------------------------------------------------------------------
    #[error("Failed to open storage at {path}: {reason}")]
    StorageOpen { path: String, reason: String },

    #[error("Failed to write document: {0}")]
    StorageWrite(String),

    #[error("Posting list update for token {token:?} failed: {reason}")]
    Merge { token: String, reason: String },

    /// The document was stored but only `indexed` of `total` tokens reached
    /// their posting lists. It is re-indexed the next time the index opens.
    #[error("Document {id} partially indexed ({indexed}/{total} tokens), token {token:?} failed: {reason}")]
    PartialIndex {
        id: String,
        indexed: usize,
        total: usize,
        token: String,
        reason: String,
    },

    #[error("Durable flush failed: {0}")]
    Flush(String),

    // -------------------------------------------------------------------------
    // Query Errors
    // -------------------------------------------------------------------------
    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Unknown term: {0}")]
    TermNotFound(String),
}
