#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("payload of {size} bytes exceeds the maximum {max} bytes the codec supports")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("failed to render QR symbol: {0}")]
    Encode(String),

    #[error("could not decode a QR symbol from the frame, even after contrast retry")]
    Decode,

    #[error("multi-chunk payload incomplete: have {have} of {expected} chunks")]
    IncompleteChunks { have: usize, expected: usize },

    #[error("multi-chunk payload has inconsistent chunk headers (mismatched total_chunks or hash prefix)")]
    InconsistentChunks,

    #[error("reassembled payload hash does not match the header's hash prefix")]
    HashMismatch,

    #[error("frame geometry mismatch: expected {expected_w}x{expected_h}, got {got_w}x{got_h}")]
    GeometryMismatch {
        expected_w: u32,
        expected_h: u32,
        got_w: u32,
        got_h: u32,
    },
}
