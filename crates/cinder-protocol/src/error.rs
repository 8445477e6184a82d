//! Protocol error types for RESP parsing.

use thiserror::Error;

/// Errors that can occur when parsing the RESP wire format.
///
/// Any variant other than [`Incomplete`](ProtocolError::Incomplete)
/// desynchronizes the connection: the session replies with a protocol
/// error and closes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The input buffer doesn't contain a complete frame yet.
    /// The caller should read more data and try again.
    #[error("incomplete frame: need more data")]
    Incomplete,

    /// The first byte of a frame didn't match any known RESP type prefix.
    #[error("invalid type prefix: {0:#04x}")]
    InvalidPrefix(u8),

    /// Failed to parse an integer value from the frame content.
    #[error("invalid integer encoding")]
    InvalidInteger,

    /// A bulk string or array declared an invalid length. Only `-1`
    /// (null) is a legal negative length.
    #[error("invalid frame length: {0}")]
    InvalidFrameLength(i64),

    /// A bulk string declared a length above the 512 MiB cap.
    #[error("bulk string of {0} bytes exceeds the maximum")]
    BulkTooLarge(usize),

    /// Arrays were nested deeper than the protocol allows.
    #[error("frame nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    /// An array declared more elements than the protocol allows.
    #[error("array of {0} elements exceeds the maximum")]
    TooManyElements(usize),

    /// A simple string or error frame contained bytes that are not
    /// valid UTF-8.
    #[error("invalid utf-8 in {0} frame")]
    InvalidUtf8(&'static str),
}
