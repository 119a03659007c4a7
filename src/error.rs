//! Error types for kindling operations.

use thiserror::Error;

/// Fatal errors raised while reading or writing KFX containers.
///
/// Format errors abort the current read or write; recoverable stylesheet
/// issues are reported as [`crate::css::StyleWarning`] instead and never
/// surface here.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("bad signature, expected {expected:?}")]
    Signature { expected: &'static str },

    #[error("unsupported version {found} (maximum {max})")]
    Version { found: u16, max: u16 },

    #[error("unsupported encoding: compression={compression}, drm={drm}")]
    UnsupportedEncoding { compression: i64, drm: i64 },

    #[error("truncated input while reading {what}")]
    Truncated { what: &'static str },

    #[error("ITF decode error: {0}")]
    ItfDecode(String),

    #[error("duplicate fragment ({ftype}, {fid})")]
    DuplicateFragment { ftype: u64, fid: u64 },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, FormatError>;
