//! Document codec error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BsonError {
    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("invalid length prefix: {0}")]
    InvalidLength(i32),

    #[error("document length mismatch: declared {declared} bytes, consumed {consumed}")]
    LengthMismatch { declared: usize, consumed: usize },

    #[error("unknown element type: 0x{0:02X}")]
    UnknownElementType(u8),

    #[error("invalid UTF-8 in document string")]
    InvalidUtf8,

    #[error("missing NUL terminator")]
    MissingTerminator,

    #[error("nesting too deep (limit: {limit})")]
    NestingTooDeep { limit: usize },
}
