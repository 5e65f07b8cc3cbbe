//! # jupiter-index
//!
//! A document store with an inverted token index:
//! - Documents stored under generated UUIDs
//! - Per-token posting lists extended through an engine merge operator
//! - Bounded-concurrency ingestion
//! - Identifier lookups and multi-term AND queries
//! - An embedded WAL + SSTable key-value engine underneath
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      DocumentIndex                          │
//! └───────────────┬─────────────────────────────┬───────────────┘
//!                 │                             │
//!   ┌─────────────▼─────────────┐   ┌───────────▼───────────┐
//!   │ Ingestor                  │   │ QueryEngine           │
//!   │ (AdmissionControl gate)   │   │ (id lookup / AND)     │
//!   └─────────────┬─────────────┘   └───────────┬───────────┘
//!                 │                             │
//! ┌───────────────▼─────────────────────────────▼───────────────┐
//! │                 KvStore (storage adapter)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │  (RwLock)   │
//!   └─────────────┘          └──────┬──────┘
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Storage   │
//!                           │  (SSTable)  │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;

pub mod document;
pub mod adapter;
pub mod admission;
pub mod ingest;
pub mod query;
pub mod footprint;
pub mod index;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{IndexError, Result};
pub use config::Config;
pub use engine::Engine;
pub use document::{DocumentId, FieldTokens};
pub use index::DocumentIndex;
pub use query::QueryOutcome;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of jupiter-index
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
