//! The video-coded storage backend (`spec.md` §4.6–§4.8): a `.mvi` binary
//! frame index, a pluggable native/in-process video codec adapter, and the
//! consolidated-video `StorageBackend` implementation that ties them
//! together with content-hash deduplication and multi-strategy read
//! recovery.

mod backend;
pub mod codec;
mod error;
mod frame_index;
mod manifest;

pub use backend::VideoBackend;
pub use codec::{default_options, select_codec, EncodeOptions, OnCodecMissing, PixelFormat, VideoCodec, VideoCodecKind};
pub use error::VideoError;
pub use frame_index::{FrameIndexReader, ENTRY_LEN, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use manifest::VideoManifest;
