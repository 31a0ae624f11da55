//! Internal: Declare an Error type for burrow-bytes

use thiserror::Error;

/// Error type for decoding objects from bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The object was truncated: more bytes are needed before it can
    /// be decoded.
    #[error("object truncated (or not fully present)")]
    Truncated,
    /// There were bytes left over after we expected the object to end.
    #[error("extra bytes at end of object")]
    ExtraneousBytes,
    /// The object was malformed in some way.
    #[error("bad object: {0}")]
    BadMessage(&'static str),
}
