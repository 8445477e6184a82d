//! RESP reply encoding.
//!
//! Frames write themselves straight into the session's `BytesMut`
//! output buffer — no intermediate allocation, and pipelined replies
//! accumulate into a single write. Every frame starts with the same
//! shape (prefix byte, decimal, CRLF), so one header helper covers
//! integers, bulk lengths, and array counts; `itoa` does the
//! number-to-ASCII conversion on the stack.

use bytes::BufMut;
use bytes::BytesMut;

use crate::types::Frame;

impl Frame {
    /// Appends this frame's wire encoding to `dst`: prefix byte,
    /// payload, `\r\n` terminators, nested frames and all.
    ///
    /// Simple strings and errors must not contain CR or LF — the
    /// dispatch layer never constructs them from client-controlled
    /// bytes.
    pub fn serialize(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                dst.put_slice(s.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Error(msg) => {
                dst.put_u8(b'-');
                dst.put_slice(msg.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Integer(n) => put_header(dst, b':', *n),
            Frame::Bulk(data) => {
                put_header(dst, b'$', data.len() as i64);
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                put_header(dst, b'*', items.len() as i64);
                for item in items {
                    item.serialize(dst);
                }
            }
            Frame::NullArray => dst.put_slice(b"*-1\r\n"),
        }
    }

    /// Serializes this frame into a freshly-allocated buffer.
    ///
    /// Convenience for callers that hand the bytes off immediately
    /// (AOF records, pub/sub deliveries).
    pub fn to_bytes(&self) -> bytes::Bytes {
        let mut buf = BytesMut::new();
        self.serialize(&mut buf);
        buf.freeze()
    }
}

/// Emits the `<prefix><decimal>\r\n` header every frame type opens
/// with.
fn put_header(dst: &mut BytesMut, prefix: u8, n: i64) {
    let mut digits = itoa::Buffer::new();
    dst.put_u8(prefix);
    dst.put_slice(digits.format(n).as_bytes());
    dst.put_slice(b"\r\n");
}
