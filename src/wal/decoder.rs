//! Streaming WAL decoder
//!
//! Pull-based: reads one header + payload at a time off any byte source,
//! buffering nothing beyond the entry in flight. A corrupt entry (bad CRC,
//! unknown type) is yielded as an error and decoding continues; truncation
//! ends the stream.

use std::io::Read;

use super::entry::{WalEntry, WalError, WalHeader, HEADER_SIZE};
use crate::common_utils::crc32;

/// Iterator over `Result<WalEntry, WalError>` decoded from a byte source.
///
/// All decoding state lives here; two decoders over the same bytes produce
/// the same entries.
pub struct WalDecoder<R: Read> {
    reader: R,
    offset: u64,
    entries_decoded: u64,
    done: bool,
}

impl<R: Read> WalDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0, entries_decoded: 0, done: false }
    }

    /// Byte offset of the next entry boundary
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn entries_decoded(&self) -> u64 {
        self.entries_decoded
    }

    /// Read exactly `buf.len()` bytes; returns how many were actually read
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize, WalError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(WalError::Io(e.to_string())),
            }
        }
        Ok(filled)
    }

    fn next_entry(&mut self) -> Option<Result<WalEntry, WalError>> {
        let mut header_buf = [0u8; HEADER_SIZE];
        let have = match self.read_full(&mut header_buf) {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        if have == 0 {
            // Clean EOF at an entry boundary
            self.done = true;
            return None;
        }
        if have < HEADER_SIZE {
            self.done = true;
            return Some(Err(WalError::TruncatedHeader { have }));
        }

        // Length and checksum sit at fixed offsets, so the payload can be
        // consumed even when the type byte is unknown.
        let payload_len = u16::from_le_bytes([header_buf[0], header_buf[1]]) as usize;
        let mut payload = vec![0u8; payload_len];
        let have = match self.read_full(&mut payload) {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        if have < payload_len {
            self.done = true;
            return Some(Err(WalError::TruncatedPayload { want: payload_len, have }));
        }
        self.offset += (HEADER_SIZE + payload_len) as u64;

        let header = match WalHeader::from_bytes(&header_buf) {
            Ok(h) => h,
            Err(e) => return Some(Err(e)),
        };

        let computed = crc32(&payload);
        if computed != header.checksum {
            return Some(Err(WalError::ChecksumMismatch {
                stored: header.checksum,
                computed,
            }));
        }

        self.entries_decoded += 1;
        Some(Ok(WalEntry { header, payload }))
    }
}

impl<R: Read> Iterator for WalDecoder<R> {
    type Item = Result<WalEntry, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.next_entry()
    }
}

/// Epoch / sequence monotonicity checker, fed each decoded header in stream
/// order. A lower epoch than any previously seen means a stale writer kept
/// appending after failover.
#[derive(Debug, Default)]
pub struct EpochTracker {
    last: Option<(u32, u64)>,
}

impl EpochTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, header: &WalHeader) -> Result<(), WalError> {
        let result = match self.last {
            Some((epoch, _)) if header.epoch < epoch => {
                Err(WalError::StaleEpoch { last: epoch, seen: header.epoch })
            }
            Some((epoch, seq)) if header.epoch == epoch && header.seq_id <= seq => {
                Err(WalError::SeqNotIncreasing { last: seq, seen: header.seq_id })
            }
            _ => Ok(()),
        };
        if result.is_ok() {
            self.last = Some((header.epoch, header.seq_id));
        }
        result
    }
}
