//! The in-process codec adapter: a portable fallback requiring no external
//! binary (`spec.md` §4.7). Trades the native adapter's real H.264
//! compression for guaranteed availability and exact round-tripping — every
//! frame's RGBA bytes are stored verbatim as its sample payload, boxed in a
//! minimal ISO-BMFF-shaped container (a real `ftyp` box identifies the
//! stream as MP4; the sample table after it is this crate's own, read back
//! only by this codec).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use mem_model::{FrameIndexEntry, FrameType};

use crate::codec::{EncodeOptions, EncodedVideo, VideoCodec};
use crate::error::VideoError;
use crate::frame_index::FrameIndexReader;
use mem_qr::QrFrame;

const FTYP_BRAND: &[u8; 4] = b"isom";
const SAMPLES_BOX_TAG: &[u8; 4] = b"fRAW";

fn ftyp_box() -> Vec<u8> {
    let mut box_bytes = Vec::new();
    box_bytes.extend_from_slice(&0u32.to_be_bytes()); // size, patched below
    box_bytes.extend_from_slice(b"ftyp");
    box_bytes.extend_from_slice(FTYP_BRAND);
    box_bytes.extend_from_slice(&0u32.to_be_bytes()); // minor version
    box_bytes.extend_from_slice(FTYP_BRAND);
    box_bytes.extend_from_slice(b"mp41");
    let len = box_bytes.len() as u32;
    box_bytes[0..4].copy_from_slice(&len.to_be_bytes());
    box_bytes
}

pub struct InProcessCodec;

impl InProcessCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InProcessCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoCodec for InProcessCodec {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn initialize(&self) -> Result<(), VideoError> {
        Ok(())
    }

    fn dispose(&self) -> Result<(), VideoError> {
        Ok(())
    }

    fn encode(&self, frames: &[QrFrame], options: &EncodeOptions) -> Result<EncodedVideo, VideoError> {
        let mut bytes = ftyp_box();
        let samples_box_start = bytes.len();
        // Box header patched in after the payload length is known.
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(SAMPLES_BOX_TAG);
        bytes
            .write_u32::<LittleEndian>(frames.len() as u32)
            .map_err(|e| VideoError::io("in_process.encode.header", e))?;

        let mut frame_index = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            let frame_number = i as u32;
            let is_keyframe = frame_number % options.gop == 0;
            let byte_offset = bytes.len() as u64 - samples_box_start as u64;

            bytes
                .write_u32::<LittleEndian>(frame.rgba.len() as u32)
                .map_err(|e| VideoError::io("in_process.encode.frame_header", e))?;
            bytes.extend_from_slice(&frame.rgba);

            frame_index.push(FrameIndexEntry {
                frame_number,
                byte_offset,
                frame_size: frame.rgba.len() as u32 + 4,
                frame_type: if is_keyframe { FrameType::I } else { FrameType::P },
                timestamp_ms: (frame_number as u64 * 1000 / options.fps as u64) as u32,
                is_keyframe,
            });
        }

        let samples_box_len = (bytes.len() - samples_box_start) as u32;
        bytes[samples_box_start..samples_box_start + 4].copy_from_slice(&samples_box_len.to_be_bytes());

        Ok(EncodedVideo {
            bytes,
            frame_index,
            metadata: serde_json::json!({
                "codec": "in-process",
                "frame_count": frames.len(),
                "compressed": false,
            }),
        })
    }

    fn decode_frame(
        &self,
        mp4_bytes: &[u8],
        frame_index: &FrameIndexReader,
        frame_number: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<QrFrame, VideoError> {
        let entry = frame_index
            .get_frame(frame_number)
            .ok_or_else(|| VideoError::InvalidFrameIndex(format!("frame {frame_number} out of range")))?;

        let samples_box_start = ftyp_box().len();
        if mp4_bytes.len() < samples_box_start + 12 {
            return Err(VideoError::Decode {
                stage: mem_storage::DecodeStage::Video,
                retryable: false,
            });
        }
        let mut header_cursor = Cursor::new(&mp4_bytes[samples_box_start + 8..samples_box_start + 12]);
        let declared_frame_count = header_cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| VideoError::io("in_process.decode.header", e))?;
        if entry.frame_number >= declared_frame_count {
            return Err(VideoError::InvalidFrameIndex(format!(
                "frame {} beyond declared count {declared_frame_count}",
                entry.frame_number
            )));
        }

        let payload_start = samples_box_start + 12 + entry.byte_offset as usize;
        if payload_start + 4 > mp4_bytes.len() {
            return Err(VideoError::Decode {
                stage: mem_storage::DecodeStage::Video,
                retryable: true,
            });
        }
        let mut len_cursor = Cursor::new(&mp4_bytes[payload_start..payload_start + 4]);
        let declared_len = len_cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| VideoError::io("in_process.decode.frame_header", e))? as usize;
        let data_start = payload_start + 4;
        let data_end = data_start + declared_len;
        if data_end > mp4_bytes.len() {
            return Err(VideoError::Decode {
                stage: mem_storage::DecodeStage::Video,
                retryable: true,
            });
        }

        let rgba = mp4_bytes[data_start..data_end].to_vec();
        let expected = frame_width as usize * frame_height as usize * 4;
        if rgba.len() != expected {
            return Err(VideoError::Decode {
                stage: mem_storage::DecodeStage::Video,
                retryable: false,
            });
        }
        Ok(QrFrame::new(frame_width, frame_height, rgba))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_index::FrameIndexReader;

    fn frame(width: u32, height: u32, fill: u8) -> QrFrame {
        QrFrame::new(width, height, vec![fill; (width * height * 4) as usize])
    }

    #[test]
    fn encode_then_decode_round_trips_every_frame() {
        let codec = InProcessCodec::new();
        let frames = vec![frame(4, 4, 10), frame(4, 4, 20), frame(4, 4, 30)];
        let options = EncodeOptions {
            gop: 2,
            ..Default::default()
        };
        let encoded = codec.encode(&frames, &options).unwrap();
        assert_eq!(encoded.frame_index.len(), 3);
        assert!(encoded.frame_index[0].is_keyframe);
        assert!(!encoded.frame_index[1].is_keyframe);
        assert!(encoded.frame_index[2].is_keyframe);

        let reader = FrameIndexReader::from_entries(encoded.frame_index.clone()).unwrap();
        for (i, original) in frames.iter().enumerate() {
            let decoded = codec
                .decode_frame(&encoded.bytes, &reader, i as u32, 4, 4)
                .unwrap();
            assert_eq!(decoded, *original);
        }
    }

    #[test]
    fn empty_frame_list_encodes_to_zero_frame_index() {
        let codec = InProcessCodec::new();
        let encoded = codec.encode(&[], &EncodeOptions::default()).unwrap();
        assert!(encoded.frame_index.is_empty());
    }

    #[test]
    fn is_available_is_always_true() {
        assert!(InProcessCodec::new().is_available());
    }
}
