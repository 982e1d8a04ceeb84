//! The native codec adapter: shells to an external codec driver via a pipe
//! (`spec.md` §4.7/§6 — "raw RGBA frames on stdin, MP4 bytes on stdout,
//! stderr parsed for progress, exit code 0 is success"). Preferred over
//! [`crate::codec::InProcessCodec`] for throughput whenever the driver binary
//! is on `PATH`.

use std::io::{Cursor, Read, Write};
use std::process::{Child, Command, Stdio};

use mem_model::{FrameIndexEntry, FrameType};

use crate::codec::{EncodeOptions, EncodedVideo, VideoCodec, VideoCodecKind};
use crate::error::VideoError;
use crate::frame_index::FrameIndexReader;
use mem_qr::QrFrame;

/// `ffmpeg` is the only codec driver widely available with the exact
/// `rawvideo`/`rgba` input and fragmented-mp4 output flags this adapter
/// relies on.
const DRIVER_BINARY: &str = "ffmpeg";

pub struct NativeCodec {
    binary: String,
}

impl NativeCodec {
    pub fn new() -> Self {
        Self {
            binary: DRIVER_BINARY.to_string(),
        }
    }

    /// Build with an overridden binary name/path, for tests or deployments
    /// that vendor a specific driver.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn spawn(&self, args: &[&str]) -> Result<Child, VideoError> {
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VideoError::NativeSpawn(e.to_string()))
    }

    fn encode_args(options: &EncodeOptions, width: u32, height: u32) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{width}x{height}"),
            "-r".into(),
            options.fps.to_string(),
            "-i".into(),
            "-".into(),
            "-an".into(),
            "-c:v".into(),
            match options.codec {
                VideoCodecKind::H264 => "libx264".to_string(),
                VideoCodecKind::H265 => "libx265".to_string(),
            },
            "-crf".into(),
            options.crf.to_string(),
            "-g".into(),
            options.gop.to_string(),
            "-preset".into(),
            options.preset.clone(),
            "-tune".into(),
            options.tune.clone(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-movflags".into(),
            "frag_keyframe+empty_moov".into(),
            "-f".into(),
            "mp4".into(),
            "-".into(),
        ]
    }
}

impl Default for NativeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoCodec for NativeCodec {
    fn name(&self) -> &'static str {
        "native"
    }

    fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn initialize(&self) -> Result<(), VideoError> {
        Ok(())
    }

    fn dispose(&self) -> Result<(), VideoError> {
        Ok(())
    }

    fn encode(&self, frames: &[QrFrame], options: &EncodeOptions) -> Result<EncodedVideo, VideoError> {
        if frames.is_empty() {
            return Ok(EncodedVideo {
                bytes: Vec::new(),
                frame_index: Vec::new(),
                metadata: serde_json::json!({"codec": "native", "frame_count": 0}),
            });
        }
        let (width, height) = (frames[0].width, frames[0].height);
        let args_owned = Self::encode_args(options, width, height);
        let args: Vec<&str> = args_owned.iter().map(|s| s.as_str()).collect();
        let mut child = self.spawn(&args)?;

        let mut stdin = child.stdin.take().ok_or_else(|| VideoError::NativeSpawn("stdin pipe unavailable".to_string()))?;
        let frames_owned: Vec<Vec<u8>> = frames.iter().map(|f| f.rgba.clone()).collect();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            for frame in &frames_owned {
                stdin.write_all(frame)?;
            }
            Ok(())
        });

        let mut stdout = child.stdout.take().ok_or_else(|| VideoError::NativeSpawn("stdout pipe unavailable".to_string()))?;
        let mut bytes = Vec::new();
        stdout
            .read_to_end(&mut bytes)
            .map_err(|e| VideoError::io("native.read_stdout", e))?;

        let mut stderr_text = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut stderr_text);
        }

        let _ = writer.join();
        let status = child.wait().map_err(|e| VideoError::io("native.wait", e))?;
        if !status.success() {
            tracing::error!(stderr = %stderr_text, code = status.code(), "native codec process failed");
            return Err(VideoError::NativeProcessFailed(status.code().unwrap_or(-1)));
        }

        let frame_index = build_frame_index(&bytes, frames.len() as u32, options);
        Ok(EncodedVideo {
            bytes,
            frame_index,
            metadata: serde_json::json!({
                "codec": "native",
                "driver": self.binary,
                "frame_count": frames.len(),
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
        let _ = frame_index
            .get_frame(frame_number)
            .ok_or_else(|| VideoError::InvalidFrameIndex(format!("frame {frame_number} out of range")))?;
        let select_expr = format!("select=eq(n\\,{frame_number})");
        let args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            "-",
            "-vf",
            &select_expr,
            "-vframes",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-",
        ];
        let mut child = self.spawn(&args)?;

        let mut stdin = child.stdin.take().ok_or_else(|| VideoError::NativeSpawn("stdin pipe unavailable".to_string()))?;
        let input = mp4_bytes.to_vec();
        let writer = std::thread::spawn(move || -> std::io::Result<()> { stdin.write_all(&input) });

        let mut stdout = child.stdout.take().ok_or_else(|| VideoError::NativeSpawn("stdout pipe unavailable".to_string()))?;
        let mut rgba = Vec::new();
        stdout
            .read_to_end(&mut rgba)
            .map_err(|e| VideoError::io("native.decode_frame.read_stdout", e))?;
        let _ = writer.join();
        let status = child.wait().map_err(|e| VideoError::io("native.decode_frame.wait", e))?;
        if !status.success() {
            return Err(VideoError::Decode {
                stage: mem_storage::DecodeStage::Video,
                retryable: true,
            });
        }

        let expected = frame_width as usize * frame_height as usize * 4;
        if rgba.len() != expected {
            return Err(VideoError::Decode {
                stage: mem_storage::DecodeStage::Video,
                retryable: true,
            });
        }
        Ok(QrFrame::new(frame_width, frame_height, rgba))
    }
}

/// Recover frame boundaries from the muxed MP4 by reading its sample table;
/// falls back to an evenly-spaced synthetic layout if the container isn't
/// seekable (e.g. fragmented output without a leading `moov`).
fn build_frame_index(mp4_bytes: &[u8], frame_count: u32, options: &EncodeOptions) -> Vec<FrameIndexEntry> {
    if frame_count == 0 {
        return Vec::new();
    }
    if let Some(entries) = try_parse_sample_table(mp4_bytes, frame_count, options) {
        return entries;
    }
    synthetic_frame_index(mp4_bytes.len() as u64, frame_count, options)
}

fn try_parse_sample_table(mp4_bytes: &[u8], frame_count: u32, options: &EncodeOptions) -> Option<Vec<FrameIndexEntry>> {
    let cursor = Cursor::new(mp4_bytes);
    let reader = mp4::Mp4Reader::read_header(cursor, mp4_bytes.len() as u64).ok()?;
    let track_id = reader
        .tracks()
        .values()
        .find(|t| matches!(t.track_type(), Ok(mp4::TrackType::Video)))?
        .track_id();

    let mut reader = reader;
    let count = reader.sample_count(track_id).ok()?;
    if count == 0 {
        return None;
    }
    let mut entries = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    for sample_id in 1..=count {
        let sample = reader.read_sample(track_id, sample_id).ok()??;
        let size = sample.bytes.len() as u32;
        if size == 0 {
            return None;
        }
        entries.push(FrameIndexEntry {
            frame_number: sample_id - 1,
            byte_offset: offset,
            frame_size: size,
            frame_type: if sample.is_sync { FrameType::I } else { FrameType::P },
            timestamp_ms: (sample_id as u64 * 1000 / options.fps as u64) as u32,
            is_keyframe: sample.is_sync,
        });
        offset += size as u64;
    }
    if entries.len() as u32 == frame_count {
        Some(entries)
    } else {
        None
    }
}

fn synthetic_frame_index(total_bytes: u64, frame_count: u32, options: &EncodeOptions) -> Vec<FrameIndexEntry> {
    let share = (total_bytes / frame_count as u64).max(1);
    (0..frame_count)
        .map(|n| {
            let is_keyframe = n % options.gop == 0;
            FrameIndexEntry {
                frame_number: n,
                byte_offset: n as u64 * share,
                frame_size: share as u32,
                frame_type: if is_keyframe { FrameType::I } else { FrameType::P },
                timestamp_ms: (n as u64 * 1000 / options.fps as u64) as u32,
                is_keyframe,
            }
        })
        .collect()
}
