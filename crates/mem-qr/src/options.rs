//! Caller-selectable QR encode parameters (`spec.md` §6: `qr.ecc`, `qr.version`).
//!
//! [`crate::encode`] always auto-selects from [`crate::CAPACITY_TABLE`]; callers
//! that need a specific error-correction level or a fixed symbol version (e.g.
//! to keep every frame in a scope at one physical size) go through
//! [`crate::encode_with_options`] instead.

use qrcode::EcLevel;

/// Error-correction level, mirroring `qrcode::EcLevel` so callers outside this
/// crate don't need a direct dependency on `qrcode` just to pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrEcc {
    L,
    #[default]
    M,
    Q,
    H,
}

impl QrEcc {
    pub(crate) fn to_ec_level(self) -> EcLevel {
        match self {
            QrEcc::L => EcLevel::L,
            QrEcc::M => EcLevel::M,
            QrEcc::Q => EcLevel::Q,
            QrEcc::H => EcLevel::H,
        }
    }
}

/// Which row of [`crate::CAPACITY_TABLE`] to render with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrVersionPref {
    /// Smallest version that fits the payload in one frame (or the largest
    /// when chunking); the default, and the only behavior `crate::encode`
    /// ever exercises.
    #[default]
    Auto,
    /// Pin every frame to the table entry for this QR version, single-frame
    /// or chunked. Rejected at encode time if no table entry has this
    /// version (`spec.md` §6 lists versions 6/10/16/20).
    Fixed(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QrEncodeOptions {
    pub ecc: QrEcc,
    pub version: QrVersionPref,
}
