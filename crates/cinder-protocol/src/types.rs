//! RESP frame types.
//!
//! [`Frame`] is the unit both directions speak: requests arrive as
//! arrays of bulk strings, replies go out as whichever variant the
//! command calls for. Bulk payloads ride in `Bytes`, so a value read
//! from the keyspace reaches the wire without being copied.

use bytes::Bytes;

/// A single RESP protocol frame.
///
/// One variant per wire type, plus the two null sentinels — RESP
/// spells those as a `-1` length under the `$` and `*` prefixes
/// instead of giving them prefixes of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One-line status reply (`+OK\r\n`). Never carries CR, LF, or
    /// binary data.
    Simple(String),

    /// Error reply (`-WRONGTYPE ...\r\n`); the leading word is the
    /// error class clients match on.
    Error(String),

    /// Signed 64-bit integer reply (`:12\r\n`).
    Integer(i64),

    /// Length-prefixed payload (`$3\r\nfoo\r\n`); fully binary-safe,
    /// CRLF included.
    Bulk(Bytes),

    /// The missing-value sentinel, `$-1\r\n`.
    Null,

    /// Ordered sequence of nested frames (`*1\r\n:5\r\n`).
    Array(Vec<Frame>),

    /// The null array, `*-1\r\n` — what a broken WATCH makes EXEC
    /// return.
    NullArray,
}

impl Frame {
    /// Builds a bulk frame from anything byte-like.
    pub fn bulk(data: impl Into<Bytes>) -> Frame {
        Frame::Bulk(data.into())
    }

    /// The `+OK` reply.
    pub fn ok() -> Frame {
        Frame::Simple("OK".into())
    }

    /// Returns `true` if this frame is one of the null sentinels.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null | Frame::NullArray)
    }
}
