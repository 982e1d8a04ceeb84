//! Codec discovery (`spec.md` §4.7): prefer native if available, else
//! in-process, else fail open. Mirrors the build-by-config pattern used by
//! the teacher's index backend selection (`BackendConfig::build`), and the
//! availability-probe-and-degrade shape of its circuit breaker.

use crate::codec::{InProcessCodec, NativeCodec, VideoCodec};
use crate::error::VideoError;

/// What to do when a scope is configured for the video backend but neither
/// codec implementation is available at open time. Left as an explicit
/// policy per `spec.md` §9 ("fail open at scope-open time, or fall back to
/// file backend?") rather than guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnCodecMissing {
    #[default]
    Fail,
    Fallback,
}

/// Probe implementations in preference order and return the first available
/// one. Returns `Ok(None)` (not an error) when none are available — callers
/// decide what to do with that using their own [`OnCodecMissing`] policy.
pub fn select_codec() -> Result<Option<Box<dyn VideoCodec>>, VideoError> {
    let native = NativeCodec::new();
    if native.is_available() {
        tracing::info!(codec = native.name(), "selected native video codec");
        return Ok(Some(Box::new(native)));
    }

    let in_process = InProcessCodec::new();
    if in_process.is_available() {
        tracing::info!(codec = in_process.name(), "selected in-process video codec");
        return Ok(Some(Box::new(in_process)));
    }

    tracing::warn!("no video codec implementation available");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_process_is_always_a_viable_fallback() {
        // The native codec depends on an external binary that may not exist
        // in this environment; the in-process one never does.
        let codec = InProcessCodec::new();
        assert!(codec.is_available());
    }

    #[test]
    fn select_codec_never_errors() {
        assert!(select_codec().is_ok());
    }
}
