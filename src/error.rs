//! Crate-wide decode error.
//!
//! Each component that can fail on its own (the offset-addressed reader, the
//! decrypt/decompress step) defines a small `thiserror` enum and folds into
//! [`DecodeError`] via `#[from]`, rather than everything being one flat enum
//! from the start.

use crate::crypto::CryptoError;
use crate::reader::ReaderError;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("bad magic at offset {offset}: expected {expected:?}, found {found:?}")]
    BadMagic {
        offset: usize,
        expected: [u8; 4],
        found: [u8; 4],
    },

    #[error("length mismatch: {0}")]
    LengthMismatch(String),

    #[error("truncated input at offset {offset}: wanted {wanted} bytes, {available} available")]
    TruncatedInput {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    #[error("unknown itl section block type {0}")]
    UnknownSectionType(u32),

    #[error("bad decryption key: {0}")]
    BadKey(#[from] CryptoError),

    #[error("zlib inflate failed: {0}")]
    InflateError(#[source] std::io::Error),

    #[error("missing section: {0}")]
    MissingSection(&'static str),

    #[error("failed to read library file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ReaderError> for DecodeError {
    fn from(value: ReaderError) -> Self {
        match value {
            ReaderError::Truncated {
                offset,
                wanted,
                available,
            } => DecodeError::TruncatedInput {
                offset,
                wanted,
                available,
            },
            ReaderError::BadMagic {
                offset,
                expected,
                found,
            } => DecodeError::BadMagic {
                offset,
                expected,
                found,
            },
        }
    }
}
