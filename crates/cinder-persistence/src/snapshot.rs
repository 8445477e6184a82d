//! Point-in-time snapshot files.
//!
//! A snapshot is a self-describing whole-server dump. Writes go to a
//! `.tmp` file first and are atomically renamed on completion, so a
//! partial snapshot never corrupts the existing file.
//!
//! File layout:
//! ```text
//! REDIS0001
//! [AUX key value]*
//! per non-empty database:
//!   SELECTDB <index>
//!   RESIZEDB <key_count> <expiring_count>
//!   per key:
//!     [EXPIRETIMEMS <unix_ms: 8B LE>]
//!     <type: 1B> <key> <type-specific payload>
//! EOF
//! <crc64: 8B LE over everything above>
//! ```
//!
//! Readers verify the checksum before parsing a single record; a
//! mismatch aborts the load.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use crc::Digest;

use crate::format::{self, FormatError};

/// The value stored in a snapshot entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapValue {
    String(Bytes),
    List(Vec<Bytes>),
    Set(Vec<String>),
    /// (score, member) pairs.
    ZSet(Vec<(f64, String)>),
    Hash(Vec<(String, Bytes)>),
}

/// A single key record in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapEntry {
    pub key: String,
    pub value: SnapValue,
    /// Absolute expiry in unix ms, or `None` for persistent keys.
    pub expire_at_ms: Option<u64>,
}

/// A fully parsed snapshot.
#[derive(Debug, Default)]
pub struct SnapshotImage {
    /// Auxiliary metadata records from the file header.
    pub aux: Vec<(String, String)>,
    /// `(database index, entries)` for each non-empty database.
    pub databases: Vec<(usize, Vec<SnapEntry>)>,
}

/// Writes a complete snapshot to disk.
///
/// The file won't appear at the final path until [`finish`] runs:
/// records accumulate in a temp file that is fsynced and renamed into
/// place at the end.
///
/// [`finish`]: SnapshotWriter::finish
pub struct SnapshotWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    /// Running CRC over every byte emitted so far.
    digest: Digest<'static, u64>,
    /// Set after a successful `finish()`; the `Drop` impl removes the
    /// temp file otherwise.
    finished: bool,
}

impl SnapshotWriter {
    /// Creates a snapshot writer and emits the file header.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, FormatError> {
        let final_path = path.into();
        let tmp_path = final_path.with_extension("rdb.tmp");

        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let file = opts.open(&tmp_path)?;

        let mut this = Self {
            final_path,
            tmp_path,
            writer: BufWriter::new(file),
            digest: format::CRC64.digest(),
            finished: false,
        };
        this.emit(format::SNAPSHOT_MAGIC)?;
        this.emit(format::SNAPSHOT_VERSION)?;
        Ok(this)
    }

    /// Writes an auxiliary metadata record.
    pub fn aux(&mut self, key: &str, value: &str) -> Result<(), FormatError> {
        let mut buf = Vec::new();
        buf.push(format::OP_AUX);
        format::write_bytes(&mut buf, key.as_bytes())?;
        format::write_bytes(&mut buf, value.as_bytes())?;
        self.emit(&buf)?;
        Ok(())
    }

    /// Starts a database section: SELECTDB plus the RESIZEDB sizing
    /// hint.
    pub fn begin_db(
        &mut self,
        index: usize,
        key_count: usize,
        expiring_count: usize,
    ) -> Result<(), FormatError> {
        let mut buf = Vec::new();
        buf.push(format::OP_SELECTDB);
        format::write_length(&mut buf, index)?;
        buf.push(format::OP_RESIZEDB);
        format::write_length(&mut buf, key_count)?;
        format::write_length(&mut buf, expiring_count)?;
        self.emit(&buf)?;
        Ok(())
    }

    /// Writes one key record into the current database section.
    pub fn write_entry(&mut self, entry: &SnapEntry) -> Result<(), FormatError> {
        let mut buf = Vec::new();

        if let Some(at_ms) = entry.expire_at_ms {
            buf.push(format::OP_EXPIRETIME_MS);
            format::write_u64_le(&mut buf, at_ms)?;
        }

        match &entry.value {
            SnapValue::String(data) => {
                buf.push(format::TYPE_STRING);
                format::write_bytes(&mut buf, entry.key.as_bytes())?;
                format::write_bytes(&mut buf, data)?;
            }
            SnapValue::List(items) => {
                buf.push(format::TYPE_LIST);
                format::write_bytes(&mut buf, entry.key.as_bytes())?;
                format::write_length(&mut buf, items.len())?;
                for item in items {
                    format::write_bytes(&mut buf, item)?;
                }
            }
            SnapValue::Set(members) => {
                buf.push(format::TYPE_SET);
                format::write_bytes(&mut buf, entry.key.as_bytes())?;
                format::write_length(&mut buf, members.len())?;
                for member in members {
                    format::write_bytes(&mut buf, member.as_bytes())?;
                }
            }
            SnapValue::ZSet(members) => {
                buf.push(format::TYPE_ZSET);
                format::write_bytes(&mut buf, entry.key.as_bytes())?;
                format::write_length(&mut buf, members.len())?;
                for (score, member) in members {
                    format::write_bytes(&mut buf, member.as_bytes())?;
                    format::write_f64_le(&mut buf, *score)?;
                }
            }
            SnapValue::Hash(fields) => {
                buf.push(format::TYPE_HASH);
                format::write_bytes(&mut buf, entry.key.as_bytes())?;
                format::write_length(&mut buf, fields.len())?;
                for (field, value) in fields {
                    format::write_bytes(&mut buf, field.as_bytes())?;
                    format::write_bytes(&mut buf, value)?;
                }
            }
        }

        self.emit(&buf)?;
        Ok(())
    }

    /// Finalizes the snapshot: EOF opcode, CRC-64 footer, fsync, and
    /// atomic rename over the final path.
    pub fn finish(mut self) -> Result<(), FormatError> {
        self.emit(&[format::OP_EOF])?;

        // swap the digest out rather than moving it — `Drop` prevents
        // moving fields from `self`
        let digest = std::mem::replace(&mut self.digest, format::CRC64.digest());
        let checksum = digest.finalize();
        self.writer.write_all(&checksum.to_le_bytes())?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        fs::rename(&self.tmp_path, &self.final_path)?;
        self.finished = true;
        Ok(())
    }

    /// Writes bytes to the file and folds them into the running CRC.
    fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.digest.update(bytes);
        self.writer.write_all(bytes)
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        if !self.finished {
            // best-effort cleanup of an incomplete temp file
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Loads and verifies a snapshot file.
///
/// The CRC-64 footer is checked over the whole file before any record
/// is parsed; a mismatch fails the load.
pub fn load(path: impl AsRef<Path>) -> Result<SnapshotImage, FormatError> {
    let data = fs::read(path.as_ref())?;

    // header (9) + EOF (1) + footer (8) is the minimum possible file
    if data.len() < 18 {
        return Err(FormatError::UnexpectedEof);
    }

    let (body, footer) = data.split_at(data.len() - 8);
    let stored = u64::from_le_bytes(footer.try_into().expect("split at len - 8"));
    let actual = format::crc64(body);
    if stored != actual {
        return Err(FormatError::ChecksumMismatch {
            expected: stored,
            actual,
        });
    }

    parse_body(body)
}

fn parse_body(body: &[u8]) -> Result<SnapshotImage, FormatError> {
    let mut cur = Cursor::new(body);

    let mut magic = [0u8; 5];
    io::Read::read_exact(&mut cur, &mut magic).map_err(|_| FormatError::UnexpectedEof)?;
    if &magic != format::SNAPSHOT_MAGIC {
        return Err(FormatError::InvalidMagic);
    }
    let mut version = [0u8; 4];
    io::Read::read_exact(&mut cur, &mut version).map_err(|_| FormatError::UnexpectedEof)?;
    if &version != format::SNAPSHOT_VERSION {
        return Err(FormatError::UnsupportedVersion(
            String::from_utf8_lossy(&version).into_owned(),
        ));
    }

    let mut image = SnapshotImage::default();
    let mut pending_expire: Option<u64> = None;

    loop {
        let opcode = format::read_u8(&mut cur)?;
        match opcode {
            format::OP_EOF => break,
            format::OP_AUX => {
                let key = format::read_string(&mut cur, "aux key")?;
                let value = format::read_string(&mut cur, "aux value")?;
                image.aux.push((key, value));
            }
            format::OP_SELECTDB => {
                let index = format::read_length(&mut cur)?;
                image.databases.push((index, Vec::new()));
            }
            format::OP_RESIZEDB => {
                // sizing hints; nothing to pre-size in the image itself
                let _key_count = format::read_length(&mut cur)?;
                let _expiring_count = format::read_length(&mut cur)?;
            }
            format::OP_EXPIRETIME_MS => {
                pending_expire = Some(format::read_u64_le(&mut cur)?);
            }
            type_byte @ (format::TYPE_STRING
            | format::TYPE_LIST
            | format::TYPE_SET
            | format::TYPE_ZSET
            | format::TYPE_HASH) => {
                let key = format::read_string(&mut cur, "key")?;
                let value = read_value(&mut cur, type_byte)?;
                let entry = SnapEntry {
                    key,
                    value,
                    expire_at_ms: pending_expire.take(),
                };
                match image.databases.last_mut() {
                    Some((_, entries)) => entries.push(entry),
                    None => {
                        return Err(FormatError::InvalidData(
                            "key record before any SELECTDB".into(),
                        ))
                    }
                }
            }
            other => return Err(FormatError::UnknownOpcode(other)),
        }
    }

    Ok(image)
}

fn read_value(cur: &mut Cursor<&[u8]>, type_byte: u8) -> Result<SnapValue, FormatError> {
    match type_byte {
        format::TYPE_STRING => {
            let data = format::read_bytes(cur)?;
            Ok(SnapValue::String(Bytes::from(data)))
        }
        format::TYPE_LIST => {
            let count = format::read_length(cur)?;
            let mut items = Vec::with_capacity(count.min(65_536));
            for _ in 0..count {
                items.push(Bytes::from(format::read_bytes(cur)?));
            }
            Ok(SnapValue::List(items))
        }
        format::TYPE_SET => {
            let count = format::read_length(cur)?;
            let mut members = Vec::with_capacity(count.min(65_536));
            for _ in 0..count {
                members.push(format::read_string(cur, "set member")?);
            }
            Ok(SnapValue::Set(members))
        }
        format::TYPE_ZSET => {
            let count = format::read_length(cur)?;
            let mut members = Vec::with_capacity(count.min(65_536));
            for _ in 0..count {
                let member = format::read_string(cur, "zset member")?;
                let score = format::read_f64_le(cur)?;
                members.push((score, member));
            }
            Ok(SnapValue::ZSet(members))
        }
        format::TYPE_HASH => {
            let count = format::read_length(cur)?;
            let mut fields = Vec::with_capacity(count.min(65_536));
            for _ in 0..count {
                let field = format::read_string(cur, "hash field")?;
                let value = Bytes::from(format::read_bytes(cur)?);
                fields.push((field, value));
            }
            Ok(SnapValue::Hash(fields))
        }
        other => Err(FormatError::UnknownType(other)),
    }
}
