//! The 12-byte chunk header prefixed to every frame of a multi-chunk
//! payload (`spec.md` §6): `{chunk_index:u16, total_chunks:u16,
//! original_hash_prefix:u64}`, all little-endian.

use crate::capacity::CHUNK_HEADER_LEN;
use crate::error::QrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_index: u16,
    pub total_chunks: u16,
    pub original_hash_prefix: u64,
}

impl ChunkHeader {
    pub fn encode(&self) -> [u8; CHUNK_HEADER_LEN] {
        let mut buf = [0u8; CHUNK_HEADER_LEN];
        buf[0..2].copy_from_slice(&self.chunk_index.to_le_bytes());
        buf[2..4].copy_from_slice(&self.total_chunks.to_le_bytes());
        buf[4..12].copy_from_slice(&self.original_hash_prefix.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, QrError> {
        if bytes.len() < CHUNK_HEADER_LEN {
            return Err(QrError::Decode);
        }
        Ok(Self {
            chunk_index: u16::from_le_bytes(bytes[0..2].try_into().unwrap()),
            total_chunks: u16::from_le_bytes(bytes[2..4].try_into().unwrap()),
            original_hash_prefix: u64::from_le_bytes(bytes[4..12].try_into().unwrap()),
        })
    }
}

/// First 8 bytes of a SHA-256 digest, interpreted as a little-endian `u64`.
/// Used as the chunk header's `original_hash_prefix`; full-hash collision
/// across chunks of the same multi-frame payload is astronomically unlikely
/// and the reassembled payload's hash is re-verified against this prefix
/// after decode regardless.
pub fn hash_prefix(payload: &[u8]) -> u64 {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(payload);
    u64::from_le_bytes(digest[0..8].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_bytes() {
        let h = ChunkHeader {
            chunk_index: 3,
            total_chunks: 7,
            original_hash_prefix: 0xDEAD_BEEF_0000_1234,
        };
        let bytes = h.encode();
        let back = ChunkHeader::decode(&bytes).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn hash_prefix_is_deterministic() {
        assert_eq!(hash_prefix(b"hello"), hash_prefix(b"hello"));
        assert_ne!(hash_prefix(b"hello"), hash_prefix(b"world"));
    }
}
