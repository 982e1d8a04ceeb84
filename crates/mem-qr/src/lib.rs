//! QR codec: encode an opaque byte payload into one or more fixed-geometry
//! QR frames and decode them back, per `spec.md` §4.5/§6.
//!
//! [`encode`] picks the smallest QR version/ECC pair from the documented
//! capacity table that fits the payload in one frame, or chunks across
//! multiple frames at the highest-capacity pair when it doesn't. [`decode`]
//! reassembles chunks (order-independent, keyed by the embedded header) and
//! reverses the optional deflate pre-compression.

mod capacity;
mod chunk;
mod codec;
mod error;
mod frame;
mod options;

pub use capacity::{
    entry_for_version, max_single_frame_capacity, CapacityEntry, CAPACITY_TABLE, CHUNK_HEADER_LEN,
};
pub use chunk::ChunkHeader;
pub use codec::{decode, encode, encode_with_options, single_frame_capacity, MAX_PAYLOAD_BYTES};
pub use error::QrError;
pub use frame::QrFrame;
pub use options::{QrEcc, QrEncodeOptions, QrVersionPref};
