//! Write-Ahead Log
//!
//! Every engine mutation is appended here before it touches the memtable.
//! A batch is a single frame, so replay applies it completely or not at all.
//! The log is cut back to zero once its contents reach an SSTable.
//!
//! Frames are laid end to end:
//!
//! ```text
//! +----------+----------+----------+--------------------------+
//! | lsn: u64 | crc: u32 | len: u32 | bincode(WalEntry), len B |
//! +----------+----------+----------+--------------------------+
//! ```
//!
//! All integers are little-endian; `crc` covers the payload only.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, HEADER_SIZE};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
