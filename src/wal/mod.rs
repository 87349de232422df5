//! WAL codec
//!
//! Format: fixed 20-byte little-endian header followed by the raw payload,
//! entries concatenated with no framing between them.
//!
//! Header layout:
//! `[PayloadLen(2)][Type(1)][Ver(1)][Epoch(4)][SeqId(8)][CRC(4)]`
//!
//! CRC-32 covers the payload bytes only, not the header.

pub mod decoder;
pub mod entry;

pub use decoder::{EpochTracker, WalDecoder};
pub use entry::{WalEntry, WalEntryType, WalError, WalHeader, HEADER_SIZE, MAX_PAYLOAD_LEN};
