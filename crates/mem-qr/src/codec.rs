//! Encode/decode: opaque bytes <-> one or more [`QrFrame`]s.
//!
//! Pipeline on encode: optional deflate pre-compression -> a 1-byte envelope
//! flag marking whether the body is compressed -> single-frame or
//! chunk-header-prefixed multi-frame split -> base64 (rqrr's public API only
//! returns decoded text, never raw bytes, so every frame's binary payload is
//! carried as base64 ASCII to survive that round trip) -> QR render to RGBA.
//! Decode reverses each stage and re-verifies the reassembled payload's hash.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use qrcode::QrCode;

use crate::capacity::{
    entry_for_version, max_single_frame_capacity, multi_chunk_entry, single_frame_entry, CapacityEntry,
    CHUNK_HEADER_LEN,
};
use crate::chunk::{hash_prefix, ChunkHeader};
use crate::error::QrError;
use crate::frame::QrFrame;
use crate::options::{QrEcc, QrEncodeOptions, QrVersionPref};

const FLAG_RAW: u8 = 0x00;
const FLAG_DEFLATED: u8 = 0x01;

/// Payloads larger than this are rejected outright rather than chunked
/// without bound; chosen generously above any realistic memory item body.
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Try fast deflate; keep it only if it shrinks the payload by at least 10%,
/// per `spec.md` §4.5. Returns `(body, was_compressed)`.
fn maybe_compress(payload: &[u8]) -> (Vec<u8>, bool) {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::fast());
    if encoder.write_all(payload).is_err() {
        return (payload.to_vec(), false);
    }
    let compressed = match encoder.finish() {
        Ok(bytes) => bytes,
        Err(_) => return (payload.to_vec(), false),
    };
    if compressed.len() as f64 <= payload.len() as f64 * 0.9 {
        (compressed, true)
    } else {
        (payload.to_vec(), false)
    }
}

fn inflate(body: &[u8]) -> Result<Vec<u8>, QrError> {
    let mut decoder = DeflateDecoder::new(body);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|_| QrError::Decode)?;
    Ok(out)
}

fn render_qr(data: &[u8], version: i16, ec: qrcode::EcLevel) -> Result<QrFrame, QrError> {
    let code = QrCode::with_version(data, qrcode::Version::Normal(version), ec)
        .map_err(|e| QrError::Encode(e.to_string()))?;
    let image = code
        .render::<image::Luma<u8>>()
        .quiet_zone(true)
        .build();
    let (width, height) = (image.width(), image.height());
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for pixel in image.pixels() {
        let v = pixel.0[0];
        rgba.extend_from_slice(&[v, v, v, 255]);
    }
    Ok(QrFrame::new(width, height, rgba))
}

/// Encode an opaque payload into one or more same-geometry [`QrFrame`]s,
/// auto-selecting version/ECC from [`crate::CAPACITY_TABLE`].
pub fn encode(payload: &[u8]) -> Result<Vec<QrFrame>, QrError> {
    encode_with_options(payload, &QrEncodeOptions::default())
}

/// The single-frame entry for an envelope of `len` bytes under `options`:
/// the smallest table row that fits it in auto mode, or the caller-pinned
/// row (regardless of whether it actually fits, which only decides
/// single-frame-vs-chunked) in fixed mode.
fn resolve_single_entry(len: usize, options: &QrEncodeOptions) -> Option<CapacityEntry> {
    match options.version {
        QrVersionPref::Auto => single_frame_entry(len),
        QrVersionPref::Fixed(v) => entry_for_version(v).filter(|e| e.capacity >= len),
    }
}

/// The entry every frame of a multi-chunk payload is rendered with: the
/// highest-capacity row in auto mode, or the caller-pinned row in fixed mode
/// (an error if that version isn't in the table).
fn resolve_multi_entry(options: &QrEncodeOptions) -> Result<CapacityEntry, QrError> {
    match options.version {
        QrVersionPref::Auto => Ok(multi_chunk_entry()),
        QrVersionPref::Fixed(v) => {
            entry_for_version(v).ok_or_else(|| QrError::Encode(format!("unsupported QR version {v}")))
        }
    }
}

fn with_ecc(entry: CapacityEntry, options: &QrEncodeOptions) -> CapacityEntry {
    CapacityEntry { ec_level: options.ecc.to_ec_level(), ..entry }
}

/// Encode an opaque payload, honoring a caller-pinned ECC level and/or QR
/// version instead of the fully automatic selection `encode` performs
/// (`spec.md` §6 `qr.ecc`/`qr.version`).
pub fn encode_with_options(payload: &[u8], options: &QrEncodeOptions) -> Result<Vec<QrFrame>, QrError> {
    if payload.is_empty() {
        return Err(QrError::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(QrError::PayloadTooLarge { size: payload.len(), max: MAX_PAYLOAD_BYTES });
    }

    let original_hash_prefix = hash_prefix(payload);
    let (body, compressed) = maybe_compress(payload);

    let mut envelope = Vec::with_capacity(body.len() + 1);
    envelope.push(if compressed { FLAG_DEFLATED } else { FLAG_RAW });
    envelope.extend_from_slice(&body);

    if let Some(entry) = resolve_single_entry(envelope.len(), options) {
        let entry = with_ecc(entry, options);
        let text = BASE64.encode(&envelope);
        let frame = render_qr(text.as_bytes(), entry.version, entry.ec_level)?;
        return Ok(vec![frame]);
    }

    let entry = with_ecc(resolve_multi_entry(options)?, options);
    let usable = entry.capacity.saturating_sub(CHUNK_HEADER_LEN);
    let total_chunks = envelope.len().div_ceil(usable);
    if total_chunks > u16::MAX as usize {
        return Err(QrError::PayloadTooLarge { size: payload.len(), max: MAX_PAYLOAD_BYTES });
    }

    let mut frames = Vec::with_capacity(total_chunks);
    for (chunk_index, chunk) in envelope.chunks(usable).enumerate() {
        let header = ChunkHeader {
            chunk_index: chunk_index as u16,
            total_chunks: total_chunks as u16,
            original_hash_prefix,
        };
        let mut frame_bytes = Vec::with_capacity(CHUNK_HEADER_LEN + chunk.len());
        frame_bytes.extend_from_slice(&header.encode());
        frame_bytes.extend_from_slice(chunk);

        let text = BASE64.encode(&frame_bytes);
        frames.push(render_qr(text.as_bytes(), entry.version, entry.ec_level)?);
    }
    Ok(frames)
}

/// Decode one QR symbol's pixels back to the bytes it was rendered from
/// (before any chunk header is stripped), retrying with a binarized image
/// on failure per `spec.md` §4.5.
fn decode_frame_bytes(frame: &QrFrame) -> Result<Vec<u8>, QrError> {
    let luma = rgba_to_luma(frame);
    if let Some(text) = try_rqrr_decode(&luma, frame.width, frame.height) {
        if let Ok(bytes) = BASE64.decode(text.trim()) {
            return Ok(bytes);
        }
    }

    let binarized: Vec<u8> = luma.iter().map(|&v| if v > 128 { 255 } else { 0 }).collect();
    if let Some(text) = try_rqrr_decode(&binarized, frame.width, frame.height) {
        if let Ok(bytes) = BASE64.decode(text.trim()) {
            return Ok(bytes);
        }
    }

    Err(QrError::Decode)
}

fn rgba_to_luma(frame: &QrFrame) -> Vec<u8> {
    frame
        .rgba
        .chunks_exact(4)
        .map(|px| {
            let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
            (0.299 * r + 0.587 * g + 0.114 * b).round() as u8
        })
        .collect()
}

fn try_rqrr_decode(luma: &[u8], width: u32, height: u32) -> Option<String> {
    let image = image::GrayImage::from_raw(width, height, luma.to_vec())?;
    let mut prepared = rqrr::PreparedImage::prepare(image);
    let grids = prepared.detect_grids();
    let grid = grids.first()?;
    let (_meta, content) = grid.decode().ok()?;
    Some(content)
}

/// Decode the frames produced by one [`encode`] call (order-independent for
/// the multi-chunk case) back to the original payload.
pub fn decode(frames: &[QrFrame]) -> Result<Vec<u8>, QrError> {
    if frames.is_empty() {
        return Err(QrError::EmptyPayload);
    }

    if frames.len() == 1 {
        let envelope = decode_frame_bytes(&frames[0])?;
        // A single frame is ambiguous between "single-frame payload" and
        // "multi-chunk payload whose total_chunks happens to be 1"; try the
        // envelope first since that is by far the common case, and only a
        // valid chunk header with total_chunks==1 should be treated as such.
        if envelope.len() > CHUNK_HEADER_LEN {
            if let Ok(header) = ChunkHeader::decode(&envelope) {
                if header.total_chunks == 1 && header.chunk_index == 0 {
                    return finish(vec![envelope[CHUNK_HEADER_LEN..].to_vec()], header.original_hash_prefix);
                }
            }
        }
        return finish_envelope(envelope);
    }

    let mut chunks: Vec<(ChunkHeader, Vec<u8>)> = Vec::with_capacity(frames.len());
    for frame in frames {
        let bytes = decode_frame_bytes(frame)?;
        let header = ChunkHeader::decode(&bytes)?;
        chunks.push((header, bytes[CHUNK_HEADER_LEN..].to_vec()));
    }

    let expected_total = chunks[0].0.total_chunks;
    let expected_hash = chunks[0].0.original_hash_prefix;
    for (header, _) in &chunks {
        if header.total_chunks != expected_total || header.original_hash_prefix != expected_hash {
            return Err(QrError::InconsistentChunks);
        }
    }
    if chunks.len() != expected_total as usize {
        return Err(QrError::IncompleteChunks { have: chunks.len(), expected: expected_total as usize });
    }

    chunks.sort_by_key(|(header, _)| header.chunk_index);
    for (i, (header, _)) in chunks.iter().enumerate() {
        if header.chunk_index as usize != i {
            return Err(QrError::InconsistentChunks);
        }
    }

    let body: Vec<Vec<u8>> = chunks.into_iter().map(|(_, bytes)| bytes).collect();
    finish(body, expected_hash)
}

fn finish(chunk_bodies: Vec<Vec<u8>>, expected_hash_prefix: u64) -> Result<Vec<u8>, QrError> {
    let mut envelope = Vec::new();
    for chunk in chunk_bodies {
        envelope.extend_from_slice(&chunk);
    }
    let payload = strip_envelope(&envelope)?;
    if hash_prefix(&payload) != expected_hash_prefix {
        return Err(QrError::HashMismatch);
    }
    Ok(payload)
}

fn finish_envelope(envelope: Vec<u8>) -> Result<Vec<u8>, QrError> {
    strip_envelope(&envelope)
}

fn strip_envelope(envelope: &[u8]) -> Result<Vec<u8>, QrError> {
    let (flag, body) = envelope.split_first().ok_or(QrError::Decode)?;
    match *flag {
        FLAG_RAW => Ok(body.to_vec()),
        FLAG_DEFLATED => inflate(body),
        _ => Err(QrError::Decode),
    }
}

/// Upper bound on the raw payload bytes a single frame can carry without
/// chunking, exposed for callers that want to size-check before encoding.
pub fn single_frame_capacity() -> usize {
    max_single_frame_capacity()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_small_payload() {
        let payload = b"hello memory core".to_vec();
        let frames = encode(&payload).unwrap();
        assert_eq!(frames.len(), 1);
        let decoded = decode(&frames).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn round_trips_exactly_one_capacity_boundary() {
        let payload = vec![b'x'; single_frame_capacity() - 1];
        let frames = encode(&payload).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(decode(&frames).unwrap(), payload);
    }

    #[test]
    fn one_byte_past_single_frame_capacity_chunks() {
        // The envelope adds one flag byte, so crossing into multi-frame
        // happens one raw payload byte earlier than the raw capacity number.
        let payload = vec![b'y'; single_frame_capacity() + 1];
        let frames = encode(&payload).unwrap();
        assert!(frames.len() > 1);
        assert_eq!(decode(&frames).unwrap(), payload);
    }

    #[test]
    fn round_trips_multi_chunk_payload() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        let frames = encode(&payload).unwrap();
        assert!(frames.len() > 1);
        let all_same_geometry = frames.windows(2).all(|w| w[0].width == w[1].width && w[0].height == w[1].height);
        assert!(all_same_geometry);
        assert_eq!(decode(&frames).unwrap(), payload);
    }

    #[test]
    fn decode_reorders_shuffled_chunks() {
        let payload: Vec<u8> = (0..5_000u32).map(|i| (i % 251) as u8).collect();
        let mut frames = encode(&payload).unwrap();
        frames.reverse();
        assert_eq!(decode(&frames).unwrap(), payload);
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(encode(&[]), Err(QrError::EmptyPayload)));
    }

    #[test]
    fn highly_compressible_payload_round_trips() {
        let payload = vec![0u8; 5_000];
        let frames = encode(&payload).unwrap();
        assert_eq!(decode(&frames).unwrap(), payload);
    }

    #[test]
    fn fixed_version_forces_a_bigger_symbol_than_auto_would_pick() {
        let payload = b"hello memory core".to_vec();
        let auto = encode(&payload).unwrap();

        let pinned = encode_with_options(
            &payload,
            &QrEncodeOptions { ecc: QrEcc::M, version: QrVersionPref::Fixed(20) },
        )
        .unwrap();

        assert_eq!(pinned.len(), 1);
        assert!(pinned[0].width > auto[0].width);
        assert_eq!(decode(&pinned).unwrap(), payload);
    }

    #[test]
    fn fixed_version_not_in_table_is_rejected() {
        let payload = b"hello".to_vec();
        let result = encode_with_options(
            &payload,
            &QrEncodeOptions { ecc: QrEcc::M, version: QrVersionPref::Fixed(12) },
        );
        assert!(matches!(result, Err(QrError::Encode(_))));
    }

    #[test]
    fn fixed_version_chunks_large_payload_at_that_versions_capacity() {
        let payload: Vec<u8> = (0..500u32).map(|i| (i % 256) as u8).collect();
        let frames = encode_with_options(
            &payload,
            &QrEncodeOptions { ecc: QrEcc::H, version: QrVersionPref::Fixed(6) },
        )
        .unwrap();
        assert!(frames.len() > 1);
        assert_eq!(decode(&frames).unwrap(), payload);
    }
}
