//! CRC32 checksums for backup records
//!
//! Every record read from disk is verified before it is decoded.

use crc32fast::Hasher;

/// CRC32 (IEEE) of `data`
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Whether `data` still hashes to `expected`
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_detects_corruption() {
        let mut data = br#"{"id":"b:1","title":"Dune"}"#.to_vec();
        let original = compute_checksum(&data);
        assert!(verify_checksum(&data, original));

        data[10] ^= 0x01;
        assert!(!verify_checksum(&data, original));
    }
}
