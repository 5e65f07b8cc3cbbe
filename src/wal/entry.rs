//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their on-disk
//! framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Frame header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },

    /// Fold `operand` into the value at `key` with the engine's merge
    /// operator. Only the operand is logged; replay needs the operator.
    Merge { key: Vec<u8>, operand: Vec<u8> },

    /// Several operations committed as one frame
    Batch(Vec<Operation>),
}

impl WalEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Encode as `[lsn][crc][len][data]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(self)
            .map_err(|e| IndexError::Serialization(format!("WAL entry: {}", e)))?;

        let len = u32::try_from(data.len()).map_err(|_| {
            IndexError::WalWrite(format!("entry of {} bytes exceeds frame limit", data.len()))
        })?;
        let crc = crc32fast::hash(&data);

        let mut frame = Vec::with_capacity(HEADER_SIZE + data.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&data);
        Ok(frame)
    }

    /// Decode one frame. Trailing bytes past the frame are ignored.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::parse(bytes)?;

        let end = HEADER_SIZE + header.len as usize;
        if bytes.len() < end {
            return Err(IndexError::WalCorruption(format!(
                "frame for LSN {} truncated: need {} bytes, have {}",
                header.lsn,
                end,
                bytes.len()
            )));
        }

        let data = &bytes[HEADER_SIZE..end];
        let actual = crc32fast::hash(data);
        if actual != header.crc {
            return Err(IndexError::WalCorruption(format!(
                "CRC mismatch for LSN {}: expected {:08x}, got {:08x}",
                header.lsn, header.crc, actual
            )));
        }

        let entry: WalEntry = bincode::deserialize(data)
            .map_err(|e| IndexError::WalCorruption(format!("undecodable entry: {}", e)))?;

        if entry.lsn != header.lsn {
            return Err(IndexError::WalCorruption(format!(
                "header LSN {} does not match entry LSN {}",
                header.lsn, entry.lsn
            )));
        }

        Ok(entry)
    }
}

/// Fixed-size prefix of every frame
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl FrameHeader {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(IndexError::WalCorruption(format!(
                "partial header: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);

        Ok(Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len),
        })
    }

    /// Total frame length including the header
    pub(crate) fn frame_len(&self) -> usize {
        HEADER_SIZE + self.len as usize
    }
}
