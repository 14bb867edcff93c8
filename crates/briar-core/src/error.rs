//! Error types for Briar core.

use thiserror::Error;

/// Errors raised while decoding or encoding wire data.
///
/// Every variant is fatal to the session that produced the bytes: nothing
/// decoded from a malformed packet is ever handed on.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unknown tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("expected {expected}, found tag 0x{found:02x}")]
    UnexpectedTag { expected: &'static str, found: u8 },

    #[error("non-canonical encoding: {0}")]
    NonCanonical(&'static str),

    #[error("length {length} exceeds maximum {max}")]
    TooLong { length: u64, max: usize },

    #[error("negative length {0}")]
    NegativeLength(i64),

    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("struct id mismatch: expected {expected}, found {found}")]
    StructId { expected: u8, found: u8 },

    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("trailing data after value")]
    TrailingData,

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while verifying a decoded message.
///
/// These are local to one message: the message is dropped and the session
/// carries on.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("signature length {0} is not a valid Ed25519 signature")]
    SignatureLength(usize),

    #[error("authored message is missing its signature")]
    MissingSignature,

    #[error("anonymous message carries a signature")]
    UnexpectedSignature,

    #[error("timestamp {0} is negative")]
    InvalidTimestamp(i64),
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, FormatError>;
