//! The `.mvi` binary frame index: `frame_number -> {byte_offset, frame_size,
//! frame_type, timestamp_ms, is_keyframe}` inside a consolidated MP4, per
//! `spec.md` §4.6/§6.
//!
//! Layout, little-endian, no padding:
//! ```text
//! header (32 bytes): magic="MVIX", version:u32, frame_count:u32, reserved[20]
//! entry  (24 bytes): frame_number:u32, byte_offset:u64, frame_size:u32,
//!                    timestamp_ms:u32, type_and_flags:u32
//! ```
//! `type_and_flags`'s low nibble is the frame kind (0=I, 1=P, 2=B); bit 31
//! marks a keyframe.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use mem_model::{FrameIndexEntry, FrameType};

use crate::error::VideoError;

pub const MAGIC: &[u8; 4] = b"MVIX";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 32;
pub const ENTRY_LEN: usize = 24;
const RESERVED_LEN: usize = 20;

/// `gop <= 60` enforced as `frame_count / keyframes <= 60`, per `spec.md` §4.6.
const MAX_GOP_RATIO: u64 = 60;

const KEYFRAME_BIT: u32 = 1 << 31;

fn frame_kind_bits(frame_type: FrameType) -> u32 {
    match frame_type {
        FrameType::I => 0,
        FrameType::P => 1,
        FrameType::B => 2,
    }
}

fn frame_kind_from_bits(bits: u32) -> Result<FrameType, VideoError> {
    match bits & 0x0F {
        0 => Ok(FrameType::I),
        1 => Ok(FrameType::P),
        2 => Ok(FrameType::B),
        other => Err(VideoError::InvalidFrameIndex(format!("unknown frame kind nibble {other}"))),
    }
}

fn validate(entries: &[FrameIndexEntry]) -> Result<(), VideoError> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut last_offset = 0u64;
    let mut keyframes = 0u64;
    for (i, entry) in entries.iter().enumerate() {
        if entry.frame_number as usize != i {
            return Err(VideoError::InvalidFrameIndex(format!(
                "entry {i} has frame_number={} (must equal its index)",
                entry.frame_number
            )));
        }
        if entry.byte_offset < last_offset {
            return Err(VideoError::InvalidFrameIndex(format!(
                "entry {i} byte_offset {} precedes previous offset {last_offset}",
                entry.byte_offset
            )));
        }
        if entry.frame_size == 0 {
            return Err(VideoError::InvalidFrameIndex(format!("entry {i} has frame_size=0")));
        }
        last_offset = entry.byte_offset;
        if entry.is_keyframe {
            keyframes += 1;
        }
    }
    if keyframes == 0 {
        return Err(VideoError::InvalidFrameIndex("frame index has no keyframes".to_string()));
    }
    let ratio = entries.len() as u64 / keyframes;
    if ratio > MAX_GOP_RATIO {
        return Err(VideoError::InvalidFrameIndex(format!(
            "frame_count/keyframes ratio {ratio} exceeds {MAX_GOP_RATIO}"
        )));
    }
    Ok(())
}

/// Serialize a complete entry list to the `.mvi` byte format in one pass.
pub fn to_bytes(entries: &[FrameIndexEntry]) -> Result<Vec<u8>, VideoError> {
    validate(entries)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + entries.len() * ENTRY_LEN);
    buf.write_all(MAGIC).map_err(|e| VideoError::io("frame_index.write_magic", e))?;
    buf.write_u32::<LittleEndian>(FORMAT_VERSION)
        .map_err(|e| VideoError::io("frame_index.write_version", e))?;
    buf.write_u32::<LittleEndian>(entries.len() as u32)
        .map_err(|e| VideoError::io("frame_index.write_count", e))?;
    buf.write_all(&[0u8; RESERVED_LEN])
        .map_err(|e| VideoError::io("frame_index.write_reserved", e))?;

    for entry in entries {
        buf.write_u32::<LittleEndian>(entry.frame_number)
            .map_err(|e| VideoError::io("frame_index.write_entry", e))?;
        buf.write_u64::<LittleEndian>(entry.byte_offset)
            .map_err(|e| VideoError::io("frame_index.write_entry", e))?;
        buf.write_u32::<LittleEndian>(entry.frame_size)
            .map_err(|e| VideoError::io("frame_index.write_entry", e))?;
        buf.write_u32::<LittleEndian>(entry.timestamp_ms)
            .map_err(|e| VideoError::io("frame_index.write_entry", e))?;
        let mut type_and_flags = frame_kind_bits(entry.frame_type);
        if entry.is_keyframe {
            type_and_flags |= KEYFRAME_BIT;
        }
        buf.write_u32::<LittleEndian>(type_and_flags)
            .map_err(|e| VideoError::io("frame_index.write_entry", e))?;
    }
    Ok(buf)
}

/// Parse a complete `.mvi` byte buffer into entries.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<FrameIndexEntry>, VideoError> {
    if bytes.len() < HEADER_LEN {
        return Err(VideoError::InvalidFrameIndex("buffer shorter than the 32-byte header".to_string()));
    }
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).map_err(|e| VideoError::io("frame_index.read_magic", e))?;
    if &magic != MAGIC {
        return Err(VideoError::InvalidFrameIndex(format!("bad magic {magic:?}, expected {MAGIC:?}")));
    }
    let version = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| VideoError::io("frame_index.read_version", e))?;
    if version != FORMAT_VERSION {
        return Err(VideoError::InvalidFrameIndex(format!("unsupported frame index version {version}")));
    }
    let frame_count = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| VideoError::io("frame_index.read_count", e))? as usize;
    let mut reserved = [0u8; RESERVED_LEN];
    cursor.read_exact(&mut reserved).map_err(|e| VideoError::io("frame_index.read_reserved", e))?;

    let expected_len = HEADER_LEN + frame_count * ENTRY_LEN;
    if bytes.len() != expected_len {
        return Err(VideoError::InvalidFrameIndex(format!(
            "buffer length {} does not match header-declared {expected_len} ({frame_count} entries)",
            bytes.len()
        )));
    }

    let mut entries = Vec::with_capacity(frame_count);
    for i in 0..frame_count {
        let frame_number = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| VideoError::io("frame_index.read_entry", e))?;
        let byte_offset = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| VideoError::io("frame_index.read_entry", e))?;
        let frame_size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| VideoError::io("frame_index.read_entry", e))?;
        let timestamp_ms = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| VideoError::io("frame_index.read_entry", e))?;
        let type_and_flags = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| VideoError::io("frame_index.read_entry", e))?;

        if frame_number as usize != i {
            return Err(VideoError::InvalidFrameIndex(format!(
                "entry {i} declares frame_number={frame_number}"
            )));
        }
        entries.push(FrameIndexEntry {
            frame_number,
            byte_offset,
            frame_size,
            frame_type: frame_kind_from_bits(type_and_flags)?,
            timestamp_ms,
            is_keyframe: type_and_flags & KEYFRAME_BIT != 0,
        });
    }
    Ok(entries)
}

pub fn write(path: &Path, entries: &[FrameIndexEntry]) -> Result<(), VideoError> {
    let bytes = to_bytes(entries)?;
    std::fs::write(path, bytes).map_err(|e| VideoError::io("frame_index.write_file", e))
}

/// A loaded `.mvi` index supporting O(1) frame lookup and backward keyframe
/// search, per `spec.md` §4.6.
#[derive(Debug, Clone, Default)]
pub struct FrameIndexReader {
    entries: Vec<FrameIndexEntry>,
}

impl FrameIndexReader {
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        let bytes = std::fs::read(path).map_err(|e| VideoError::io("frame_index.open", e))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VideoError> {
        Ok(Self { entries: from_bytes(bytes)? })
    }

    pub fn from_entries(entries: Vec<FrameIndexEntry>) -> Result<Self, VideoError> {
        validate(&entries)?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// O(1) lookup by frame number.
    pub fn get_frame(&self, n: u32) -> Option<&FrameIndexEntry> {
        self.entries.get(n as usize)
    }

    /// Nearest keyframe at or before `n`, found by a backward linear scan.
    /// Acceptable per `spec.md` §4.6 since gop is bounded at 60.
    pub fn find_nearest_keyframe(&self, n: u32) -> Option<&FrameIndexEntry> {
        let start = n as usize;
        if start >= self.entries.len() {
            return None;
        }
        self.entries[..=start].iter().rev().find(|e| e.is_keyframe)
    }

    pub fn entries(&self) -> &[FrameIndexEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u32, offset: u64, keyframe: bool) -> FrameIndexEntry {
        FrameIndexEntry {
            frame_number: n,
            byte_offset: offset,
            frame_size: 100,
            frame_type: if keyframe { FrameType::I } else { FrameType::P },
            timestamp_ms: n * 33,
            is_keyframe: keyframe,
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let entries = vec![entry(0, 0, true), entry(1, 100, false), entry(2, 200, false)];
        let bytes = to_bytes(&entries).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 3 * ENTRY_LEN);
        let back = from_bytes(&bytes).unwrap();
        assert_eq!(back, entries);
    }

    #[test]
    fn reader_supports_o1_lookup_and_keyframe_scan() {
        let entries = vec![
            entry(0, 0, true),
            entry(1, 100, false),
            entry(2, 200, false),
            entry(3, 300, true),
            entry(4, 400, false),
        ];
        let reader = FrameIndexReader::from_entries(entries).unwrap();
        assert_eq!(reader.get_frame(2).unwrap().frame_number, 2);
        assert_eq!(reader.find_nearest_keyframe(2).unwrap().frame_number, 0);
        assert_eq!(reader.find_nearest_keyframe(4).unwrap().frame_number, 3);
        assert_eq!(reader.find_nearest_keyframe(0).unwrap().frame_number, 0);
    }

    #[test]
    fn rejects_frame_number_not_matching_index() {
        let entries = vec![entry(0, 0, true), entry(5, 100, false)];
        assert!(matches!(to_bytes(&entries), Err(VideoError::InvalidFrameIndex(_))));
    }

    #[test]
    fn rejects_decreasing_byte_offset() {
        let entries = vec![entry(0, 100, true), entry(1, 50, false)];
        assert!(matches!(to_bytes(&entries), Err(VideoError::InvalidFrameIndex(_))));
    }

    #[test]
    fn rejects_zero_frame_size() {
        let mut e = entry(0, 0, true);
        e.frame_size = 0;
        assert!(matches!(to_bytes(&[e]), Err(VideoError::InvalidFrameIndex(_))));
    }

    #[test]
    fn rejects_gop_ratio_beyond_60() {
        let mut entries = vec![entry(0, 0, true)];
        for i in 1..=120u32 {
            entries.push(entry(i, i as u64 * 100, false));
        }
        assert!(matches!(to_bytes(&entries), Err(VideoError::InvalidFrameIndex(_))));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = to_bytes(&[entry(0, 0, true)]).unwrap();
        bytes[0] = b'X';
        assert!(matches!(from_bytes(&bytes), Err(VideoError::InvalidFrameIndex(_))));
    }
}
