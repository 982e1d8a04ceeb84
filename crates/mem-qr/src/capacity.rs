//! Per-frame payload capacity table (`spec.md` §6) and the parameter
//! selection that picks the smallest symbol that fits a single-frame
//! payload, or the largest (highest-capacity) symbol for multi-chunk
//! payloads to minimize frame count.

use qrcode::EcLevel;

/// One row of the capacity guide: a QR version/ECC pair and how many raw
/// payload bytes it can carry in a single symbol.
#[derive(Debug, Clone, Copy)]
pub struct CapacityEntry {
    pub version: i16,
    pub ec_level: EcLevel,
    pub capacity: usize,
}

/// The documented capacity guide, smallest symbol first.
pub const CAPACITY_TABLE: &[CapacityEntry] = &[
    CapacityEntry { version: 6, ec_level: EcLevel::Q, capacity: 71 },
    CapacityEntry { version: 10, ec_level: EcLevel::M, capacity: 154 },
    CapacityEntry { version: 16, ec_level: EcLevel::M, capacity: 800 },
    CapacityEntry { version: 20, ec_level: EcLevel::M, capacity: 1600 },
];

/// Bytes the chunk header (`spec.md` §6) occupies inside a multi-frame
/// symbol's payload.
pub const CHUNK_HEADER_LEN: usize = 12;

/// The entry used for every frame of a multi-chunk payload: always the
/// highest-capacity row, since more payload per frame means fewer frames.
pub fn multi_chunk_entry() -> CapacityEntry {
    *CAPACITY_TABLE.last().expect("capacity table is non-empty")
}

/// The smallest entry whose capacity covers `len` bytes in a single frame,
/// or `None` if `len` exceeds even the largest single-frame capacity (the
/// payload must be chunked).
pub fn single_frame_entry(len: usize) -> Option<CapacityEntry> {
    CAPACITY_TABLE.iter().copied().find(|e| e.capacity >= len)
}

/// The table row for a caller-pinned QR version (`QrVersionPref::Fixed`),
/// or `None` if the table carries no entry for that version.
pub fn entry_for_version(version: u8) -> Option<CapacityEntry> {
    CAPACITY_TABLE.iter().copied().find(|e| e.version == version as i16)
}

/// Maximum raw payload bytes a single frame can ever carry (unchunked).
pub fn max_single_frame_capacity() -> usize {
    CAPACITY_TABLE.last().map(|e| e.capacity).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_picks_smallest_sufficient_entry() {
        let e = single_frame_entry(50).unwrap();
        assert_eq!(e.version, 6);
        let e = single_frame_entry(71).unwrap();
        assert_eq!(e.version, 6);
        let e = single_frame_entry(72).unwrap();
        assert_eq!(e.version, 10);
    }

    #[test]
    fn single_frame_entry_is_none_beyond_max_capacity() {
        assert!(single_frame_entry(1601).is_none());
        assert!(single_frame_entry(1600).is_some());
    }

    #[test]
    fn entry_for_version_matches_table_versions() {
        assert_eq!(entry_for_version(16).unwrap().capacity, 800);
        assert!(entry_for_version(12).is_none());
    }
}
