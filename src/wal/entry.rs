//! WAL entry format
//!
//! One entry = 20-byte header + `payload_len` payload bytes.
//! All header fields are little-endian. The checksum is CRC-32 of the
//! payload only, so a header can be parsed before the payload is read.

use crate::common_utils::{crc32, crc32_verify};

/// Header size: PayloadLen(2) + Type(1) + Ver(1) + Epoch(4) + SeqId(8) + CRC(4)
pub const HEADER_SIZE: usize = 20;

/// Payload length is a u16, so anything >= 64KB cannot be encoded
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Entry types for WAL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalEntryType {
    /// Order accepted (funds locked)
    Order = 1,
    /// Order cancelled (funds unlocked)
    Cancel = 2,
    /// Trade executed
    Trade = 3,
    /// Trade settlement applied to balances
    BalanceSettle = 4,
    /// External deposit
    Deposit = 5,
    /// External withdrawal
    Withdraw = 6,
    /// Snapshot marker
    SnapshotMarker = 7,
}

impl TryFrom<u8> for WalEntryType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WalEntryType::Order),
            2 => Ok(WalEntryType::Cancel),
            3 => Ok(WalEntryType::Trade),
            4 => Ok(WalEntryType::BalanceSettle),
            5 => Ok(WalEntryType::Deposit),
            6 => Ok(WalEntryType::Withdraw),
            7 => Ok(WalEntryType::SnapshotMarker),
            _ => Err(value),
        }
    }
}

/// Parsed 20-byte WAL header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalHeader {
    pub payload_len: u16,
    pub entry_type: WalEntryType,
    /// Format version of the payload encoding
    pub version: u8,
    /// Writer generation, bumped on failover
    pub epoch: u32,
    /// Strictly increasing within an epoch
    pub seq_id: u64,
    /// CRC-32 of the payload bytes
    pub checksum: u32,
}

impl WalHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[2] = self.entry_type as u8;
        buf[3] = self.version;
        buf[4..8].copy_from_slice(&self.epoch.to_le_bytes());
        buf[8..16].copy_from_slice(&self.seq_id.to_le_bytes());
        buf[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, WalError> {
        let payload_len = u16::from_le_bytes([buf[0], buf[1]]);
        let entry_type =
            WalEntryType::try_from(buf[2]).map_err(WalError::InvalidType)?;
        Ok(Self {
            payload_len,
            entry_type,
            version: buf[3],
            epoch: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            seq_id: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            checksum: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        })
    }
}

/// One decoded WAL entry. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub header: WalHeader,
    pub payload: Vec<u8>,
}

impl WalEntry {
    /// Build an entry from its fields, computing length and checksum
    pub fn new(
        entry_type: WalEntryType,
        version: u8,
        epoch: u32,
        seq_id: u64,
        payload: Vec<u8>,
    ) -> Result<Self, WalError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(WalError::PayloadTooLarge(payload.len()));
        }
        let header = WalHeader {
            payload_len: payload.len() as u16,
            entry_type,
            version,
            epoch,
            seq_id,
            checksum: crc32(&payload),
        };
        Ok(Self { header, payload })
    }

    /// Serialize entry to bytes: header followed by raw payload
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Checksum validity of an already-constructed entry
    pub fn checksum_ok(&self) -> bool {
        crc32_verify(&self.payload, self.header.checksum)
    }
}

/// WAL codec errors
#[derive(Debug, Clone, PartialEq)]
pub enum WalError {
    /// Payload does not fit the u16 length field
    PayloadTooLarge(usize),
    /// 1-19 bytes available where a header was expected
    TruncatedHeader { have: usize },
    /// Fewer payload bytes than the header promised; unrecoverable
    TruncatedPayload { want: usize, have: usize },
    /// Payload CRC does not match the header; entry invalid, stream continues
    ChecksumMismatch { stored: u32, computed: u32 },
    InvalidType(u8),
    /// Entry carries an epoch lower than one already seen on this stream
    StaleEpoch { last: u32, seen: u32 },
    /// seq_id did not increase within an epoch
    SeqNotIncreasing { last: u64, seen: u64 },
    Io(String),
}

impl WalError {
    /// Truncation and IO errors end the stream; everything else is per-entry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WalError::TruncatedHeader { .. }
                | WalError::TruncatedPayload { .. }
                | WalError::Io(_)
        )
    }
}

impl std::fmt::Display for WalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalError::PayloadTooLarge(len) => {
                write!(f, "Payload too large for u16 length: {} > {}", len, MAX_PAYLOAD_LEN)
            }
            WalError::TruncatedHeader { have } => {
                write!(f, "Truncated header: {} of {} bytes", have, HEADER_SIZE)
            }
            WalError::TruncatedPayload { want, have } => {
                write!(f, "Truncated payload: {} of {} bytes", have, want)
            }
            WalError::ChecksumMismatch { stored, computed } => {
                write!(f, "CRC mismatch: stored={}, computed={}", stored, computed)
            }
            WalError::InvalidType(t) => write!(f, "Invalid entry type: {}", t),
            WalError::StaleEpoch { last, seen } => {
                write!(f, "Stale writer epoch: {} after {}", seen, last)
            }
            WalError::SeqNotIncreasing { last, seen } => {
                write!(f, "seq_id not increasing: {} after {}", seen, last)
            }
            WalError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for WalError {}
