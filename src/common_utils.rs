use chrono::Utc;

/// Get current timestamp in milliseconds (UTC)
pub fn get_current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ============================================================================
// CRC32 Utilities
// ============================================================================

/// Compute CRC32 of a single byte slice
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Verify CRC32 checksum
#[inline]
pub fn crc32_verify(data: &[u8], expected: u32) -> bool {
    crc32fast::hash(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_verify() {
        let data = b"hello world";
        let crc = crc32(data);
        assert!(crc32_verify(data, crc));
        assert!(!crc32_verify(b"hello worlD", crc));
    }

    #[test]
    fn test_crc32_empty() {
        assert!(crc32_verify(&[], crc32(&[])));
    }
}
