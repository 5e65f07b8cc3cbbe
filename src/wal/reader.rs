//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{IndexError, Result};

use super::entry::FrameHeader;
use super::{WalEntry, HEADER_SIZE};

/// What the reader found at its current position
#[derive(Debug)]
pub(crate) enum Frame {
    /// A complete, checksummed entry
    Entry(WalEntry),
    /// Clean end of file
    End,
    /// The file ends in the middle of a frame
    Partial,
    /// A complete frame that failed validation
    Corrupt(String),
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Byte offset of the next unread frame
    position: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file and `WalCorruption` for a
    /// torn or damaged frame.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.next_frame()? {
            Frame::Entry(entry) => Ok(Some(entry)),
            Frame::End => Ok(None),
            Frame::Partial => Err(IndexError::WalCorruption(format!(
                "partial frame at offset {}",
                self.position
            ))),
            Frame::Corrupt(reason) => Err(IndexError::WalCorruption(reason)),
        }
    }

    /// Iterate over all valid entries, stopping after the first error
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            finished: false,
        }
    }

    /// Offset just past the last frame returned
    pub fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame> {
        let mut header = [0u8; HEADER_SIZE];
        let read = read_up_to(&mut self.reader, &mut header)?;
        if read == 0 {
            return Ok(Frame::End);
        }
        if read < HEADER_SIZE {
            return Ok(Frame::Partial);
        }

        let parsed = FrameHeader::parse(&header)?;
        let frame_len = parsed.frame_len() as u64;
        if self.position + frame_len > self.file_len {
            return Ok(Frame::Partial);
        }

        let mut frame = vec![0u8; frame_len as usize];
        frame[..HEADER_SIZE].copy_from_slice(&header);
        let got = read_up_to(&mut self.reader, &mut frame[HEADER_SIZE..])?;
        if got < parsed.len as usize {
            return Ok(Frame::Partial);
        }

        match WalEntry::deserialize(&frame) {
            Ok(entry) => {
                self.position += frame_len;
                Ok(Frame::Entry(entry))
            }
            Err(IndexError::WalCorruption(reason)) => Ok(Frame::Corrupt(reason)),
            Err(e) => Err(e),
        }
    }
}

/// Fill as much of `buf` as the file allows; returns the byte count read
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    finished: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
