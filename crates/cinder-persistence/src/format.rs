//! Binary format primitives for the snapshot file.
//!
//! The snapshot uses a compact length encoding selected by the high
//! two bits of the first byte:
//!
//! ```text
//! 00xxxxxx                      6-bit length (0..63)
//! 01xxxxxx yyyyyyyy             14-bit length (high 6 bits first)
//! 10------ then 4 bytes BE      32-bit length
//! 11------                      reserved, rejected on read
//! ```
//!
//! Multi-byte fixed-width integers (expiry timestamps, scores) are
//! little-endian. The file footer is a CRC-64 (Jones polynomial) over
//! every preceding byte, stored little-endian.

use std::io::{self, Read, Write};

use crc::{Crc, CRC_64_REDIS};
use thiserror::Error;

/// Magic bytes at the start of a snapshot file.
pub const SNAPSHOT_MAGIC: &[u8; 5] = b"REDIS";

/// Four-ASCII-digit snapshot format version.
pub const SNAPSHOT_VERSION: &[u8; 4] = b"0001";

/// Opcodes used between key records.
pub const OP_AUX: u8 = 0xFA;
pub const OP_RESIZEDB: u8 = 0xFB;
pub const OP_EXPIRETIME_MS: u8 = 0xFC;
pub const OP_SELECTDB: u8 = 0xFE;
pub const OP_EOF: u8 = 0xFF;

/// Value type bytes in key records.
pub const TYPE_STRING: u8 = 0;
pub const TYPE_LIST: u8 = 1;
pub const TYPE_SET: u8 = 2;
pub const TYPE_ZSET: u8 = 3;
pub const TYPE_HASH: u8 = 4;

/// The CRC-64 parameterization used by the snapshot footer. A static
/// so streaming digests can borrow it for `'static`.
pub static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_REDIS);

/// Maximum length we'll accept for a single length-prefixed field.
/// Keys and values are capped at 512 MiB by the protocol, so a larger
/// declared length means corruption.
pub const MAX_FIELD_LEN: usize = 512 * 1024 * 1024;

/// Errors that can occur when reading or writing persisted state.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unexpected end of file")]
    UnexpectedEof,

    #[error("invalid magic bytes")]
    InvalidMagic,

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(String),

    #[error("crc64 mismatch (expected {expected:#018x}, got {actual:#018x})")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    #[error("unknown value type: {0:#04x}")]
    UnknownType(u8),

    #[error("reserved length encoding")]
    ReservedLengthEncoding,

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("corrupt append-only log: {0}")]
    CorruptLog(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Computes a CRC-64 over a byte slice.
pub fn crc64(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

// ---------------------------------------------------------------------------
// write helpers
// ---------------------------------------------------------------------------

/// Writes a length using the variable 2-bit-prefix encoding.
pub fn write_length(w: &mut impl Write, len: usize) -> io::Result<()> {
    if len < 64 {
        w.write_all(&[len as u8])
    } else if len < 16_384 {
        w.write_all(&[0b0100_0000 | (len >> 8) as u8, (len & 0xFF) as u8])
    } else {
        let len = u32::try_from(len).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("length {len} exceeds u32::MAX"),
            )
        })?;
        w.write_all(&[0b1000_0000])?;
        w.write_all(&len.to_be_bytes())
    }
}

/// Writes a length-prefixed byte slice.
pub fn write_bytes(w: &mut impl Write, data: &[u8]) -> io::Result<()> {
    write_length(w, data.len())?;
    w.write_all(data)
}

/// Writes a `u64` in little-endian (expiry timestamps).
pub fn write_u64_le(w: &mut impl Write, val: u64) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

/// Writes an `f64` in IEEE-754 little-endian (sorted-set scores).
pub fn write_f64_le(w: &mut impl Write, val: f64) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

// ---------------------------------------------------------------------------
// read helpers
// ---------------------------------------------------------------------------

/// Reads a single byte.
pub fn read_u8(r: &mut impl Read) -> Result<u8, FormatError> {
    let mut buf = [0u8; 1];
    read_exact(r, &mut buf)?;
    Ok(buf[0])
}

/// Reads a length in the variable 2-bit-prefix encoding. The reserved
/// `11` prefix is rejected.
pub fn read_length(r: &mut impl Read) -> Result<usize, FormatError> {
    let first = read_u8(r)?;
    match first >> 6 {
        0b00 => Ok((first & 0x3F) as usize),
        0b01 => {
            let low = read_u8(r)?;
            Ok((((first & 0x3F) as usize) << 8) | low as usize)
        }
        0b10 => {
            let mut buf = [0u8; 4];
            read_exact(r, &mut buf)?;
            Ok(u32::from_be_bytes(buf) as usize)
        }
        _ => Err(FormatError::ReservedLengthEncoding),
    }
}

/// Reads a length-prefixed byte vector, bounded by [`MAX_FIELD_LEN`].
pub fn read_bytes(r: &mut impl Read) -> Result<Vec<u8>, FormatError> {
    let len = read_length(r)?;
    if len > MAX_FIELD_LEN {
        return Err(FormatError::InvalidData(format!(
            "field length {len} exceeds maximum of {MAX_FIELD_LEN}"
        )));
    }
    let mut buf = vec![0u8; len];
    read_exact(r, &mut buf)?;
    Ok(buf)
}

/// Reads a length-prefixed field and decodes it as UTF-8.
pub fn read_string(r: &mut impl Read, field: &str) -> Result<String, FormatError> {
    let bytes = read_bytes(r)?;
    String::from_utf8(bytes)
        .map_err(|_| FormatError::InvalidData(format!("{field} is not valid utf-8")))
}

/// Reads a `u64` in little-endian.
pub fn read_u64_le(r: &mut impl Read) -> Result<u64, FormatError> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads an `f64` in IEEE-754 little-endian.
pub fn read_f64_le(r: &mut impl Read) -> Result<f64, FormatError> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Reads exactly `buf.len()` bytes, returning `UnexpectedEof` on a
/// short read.
fn read_exact(r: &mut impl Read, buf: &mut [u8]) -> Result<(), FormatError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FormatError::UnexpectedEof
        } else {
            FormatError::Io(e)
        }
    })
}
