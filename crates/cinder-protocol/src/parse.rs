//! Incremental RESP parser.
//!
//! The caller owns the receive buffer; the parser walks it through an
//! [`Input`] reader that only tracks how far it has looked. A frame is
//! surfaced together with its encoded length once every byte of it is
//! present — until then the attempt reports "incomplete" and the
//! buffer is left exactly as it was, so framing restarts cleanly on
//! the next socket read.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::types::Frame;

/// Maximum nesting depth for arrays. Client commands are flat arrays
/// of bulk strings (depth 1); anything deeper than this is malformed
/// or malicious.
const MAX_NESTING_DEPTH: usize = 8;

/// Maximum number of elements in an array. A declared count costs the
/// sender only a few digits but would cost this side a Vec entry per
/// element, so it is bounded.
const MAX_ARRAY_ELEMENTS: usize = 1_048_576;

/// Maximum length of a bulk string in bytes (512 MiB).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Cap for Vec::with_capacity in array parsing. A declared count of 1M
/// elements would cost tens of megabytes up front before any child
/// data is parsed. This cap limits the initial allocation while still
/// letting the Vec grow as elements arrive.
const PREALLOC_CAP: usize = 1024;

/// Attempts to parse one frame from the front of `buf`.
///
/// Three outcomes: `Ok(Some((frame, consumed)))` when a whole frame
/// was present, `Ok(None)` when more bytes are needed, and `Err` when
/// the stream is malformed (which ends the connection).
#[inline]
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut input = Input::new(buf);
    match frame(&mut input, 0) {
        Ok(parsed) => Ok(Some((parsed, input.taken()))),
        Err(ProtocolError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

/// A read-only view of the receive buffer plus a high-water mark.
///
/// Nothing here consumes from the caller's buffer — the mark just
/// records how many bytes a successful parse would account for.
struct Input<'a> {
    buf: &'a [u8],
    mark: usize,
}

impl<'a> Input<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, mark: 0 }
    }

    /// Bytes a completed parse has accounted for so far.
    fn taken(&self) -> usize {
        self.mark
    }

    /// Bytes not yet looked at.
    fn left(&self) -> usize {
        self.buf.len() - self.mark
    }

    /// Steps over the next byte.
    fn next_byte(&mut self) -> Result<u8, ProtocolError> {
        match self.buf.get(self.mark) {
            Some(&byte) => {
                self.mark += 1;
                Ok(byte)
            }
            None => Err(ProtocolError::Incomplete),
        }
    }

    /// Returns the text up to the next CRLF and steps past the
    /// terminator.
    ///
    /// The scan looks for `\n` (memchr does the heavy lifting) and
    /// accepts it only when a `\r` sits directly before it; stray
    /// carriage returns or newlines inside the line don't terminate
    /// anything.
    fn crlf_line(&mut self) -> Result<&'a [u8], ProtocolError> {
        let start = self.mark;
        for offset in memchr::memchr_iter(b'\n', &self.buf[start..]) {
            let nl = start + offset;
            if nl > start && self.buf[nl - 1] == b'\r' {
                self.mark = nl + 1;
                return Ok(&self.buf[start..nl - 1]);
            }
        }
        Err(ProtocolError::Incomplete)
    }

    /// Reads a CRLF-terminated line as a signed decimal — the form
    /// every length and integer header takes.
    fn decimal_line(&mut self) -> Result<i64, ProtocolError> {
        ascii_to_i64(self.crlf_line()?)
    }

    /// Takes `len` payload bytes plus the closing CRLF.
    fn bulk_payload(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        if self.left() < len + 2 {
            return Err(ProtocolError::Incomplete);
        }
        let start = self.mark;
        let end = start + len;
        if self.buf[end] != b'\r' || self.buf[end + 1] != b'\n' {
            return Err(ProtocolError::InvalidFrameLength(len as i64));
        }
        self.mark = end + 2;
        Ok(Bytes::copy_from_slice(&self.buf[start..end]))
    }
}

/// Parses one frame starting at the input's current mark.
fn frame(input: &mut Input<'_>, depth: usize) -> Result<Frame, ProtocolError> {
    match input.next_byte()? {
        b'+' => {
            let line = input.crlf_line()?;
            let s = std::str::from_utf8(line)
                .map_err(|_| ProtocolError::InvalidUtf8("simple string"))?;
            Ok(Frame::Simple(s.to_owned()))
        }
        b'-' => {
            let line = input.crlf_line()?;
            let s =
                std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8("error"))?;
            Ok(Frame::Error(s.to_owned()))
        }
        b':' => Ok(Frame::Integer(input.decimal_line()?)),
        b'$' => {
            let len = input.decimal_line()?;
            if len == -1 {
                return Ok(Frame::Null);
            }
            if len < 0 {
                return Err(ProtocolError::InvalidFrameLength(len));
            }
            if len > MAX_BULK_LEN {
                return Err(ProtocolError::BulkTooLarge(len as usize));
            }
            Ok(Frame::Bulk(input.bulk_payload(len as usize)?))
        }
        b'*' => {
            let next_depth = depth + 1;
            if next_depth > MAX_NESTING_DEPTH {
                return Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH));
            }

            let count = input.decimal_line()?;
            if count == -1 {
                return Ok(Frame::NullArray);
            }
            if count < 0 {
                return Err(ProtocolError::InvalidFrameLength(count));
            }
            if count as usize > MAX_ARRAY_ELEMENTS {
                return Err(ProtocolError::TooManyElements(count as usize));
            }

            let count = count as usize;
            let mut frames = Vec::with_capacity(count.min(PREALLOC_CAP));
            for _ in 0..count {
                frames.push(frame(input, next_depth)?);
            }
            Ok(Frame::Array(frames))
        }
        other => Err(ProtocolError::InvalidPrefix(other)),
    }
}

/// Interprets an ASCII line as a signed 64-bit decimal.
///
/// The magnitude accumulates in a `u64`, which leaves headroom for
/// the one value (`-2^63`) whose absolute value doesn't fit in `i64`;
/// the sign is applied at the end under a bounds check.
fn ascii_to_i64(line: &[u8]) -> Result<i64, ProtocolError> {
    let (negative, digits) = match line.first() {
        Some(&b'-') => (true, &line[1..]),
        _ => (false, line),
    };
    if digits.is_empty() {
        return Err(ProtocolError::InvalidInteger);
    }

    let mut magnitude: u64 = 0;
    for &byte in digits {
        if !byte.is_ascii_digit() {
            return Err(ProtocolError::InvalidInteger);
        }
        magnitude = magnitude
            .checked_mul(10)
            .and_then(|m| m.checked_add(u64::from(byte - b'0')))
            .ok_or(ProtocolError::InvalidInteger)?;
    }

    if negative {
        if magnitude > i64::MAX as u64 + 1 {
            return Err(ProtocolError::InvalidInteger);
        }
        // 2^63 wraps to exactly i64::MIN; everything smaller negates
        Ok(magnitude.wrapping_neg() as i64)
    } else {
        i64::try_from(magnitude).map_err(|_| ProtocolError::InvalidInteger)
    }
}
