//! Append-only command log.
//!
//! Every successful write command is appended in its RESP array
//! encoding — the log is a replayable transcript of the server's
//! mutation history. Because one log covers every database, a `SELECT`
//! array is interleaved whenever the logged command targets a
//! different database than the previous record.
//!
//! The log grows monotonically; a background rewrite periodically
//! replaces it with a minimal sequence of reconstruction commands
//! (see [`rewrite`]).

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use cinder_protocol::{parse_frame, Frame, ProtocolError};
use tracing::warn;

use crate::format::FormatError;
use crate::snapshot::{SnapEntry, SnapValue};

/// Maximum elements per reconstruction command emitted by the rewrite.
/// Keeps any single RESP array comfortably inside protocol limits.
const REWRITE_CHUNK: usize = 512;

/// When appended records are forced to durable storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// fsync after every appended command, before replying. Safest,
    /// slowest.
    Always,
    /// fsync at most once per second from the executor's tick.
    #[default]
    EverySec,
    /// Never fsync explicitly; the kernel decides.
    No,
}

/// Builds the RESP array for one command from its parts.
fn command_frame(parts: impl IntoIterator<Item = Bytes>) -> Frame {
    Frame::Array(parts.into_iter().map(Frame::Bulk).collect())
}

/// The `SELECT <db>` marker interleaved into the log on database
/// switches.
pub fn select_frame(db: usize) -> Frame {
    command_frame([
        Bytes::from_static(b"SELECT"),
        Bytes::from(db.to_string()),
    ])
}

/// Buffered writer for appending command frames to the log.
pub struct AofWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Database targeted by the previous record. `None` right after
    /// opening a pre-existing file, which forces a SELECT before the
    /// first append — the tail of the old log may sit in any database.
    last_db: Option<usize>,
    /// Current log size in bytes, tracked so the rewrite policy never
    /// has to stat the file.
    size: u64,
}

impl AofWriter {
    /// Opens (or creates) the log in append mode.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FormatError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();

        // a brand-new log implicitly starts at database 0
        let last_db = if size == 0 { Some(0) } else { None };

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_db,
            size,
        })
    }

    /// Appends one command frame, preceded by a SELECT marker when the
    /// target database changed.
    pub fn append(&mut self, db: usize, frame: &Frame) -> Result<(), FormatError> {
        let mut buf = BytesMut::new();
        if self.last_db != Some(db) {
            select_frame(db).serialize(&mut buf);
            self.last_db = Some(db);
        }
        frame.serialize(&mut buf);
        self.writer.write_all(&buf)?;
        self.size += buf.len() as u64;
        Ok(())
    }

    /// Flushes the internal buffer to the OS.
    pub fn flush(&mut self) -> Result<(), FormatError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and fsyncs the log to disk.
    pub fn sync(&mut self) -> Result<(), FormatError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Returns the current log size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the log path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The parsed contents of an append-only log.
#[derive(Debug)]
pub struct AofLog {
    /// Every complete command frame, in append order. Includes the
    /// SELECT markers.
    pub commands: Vec<Frame>,
    /// Bytes of truncated trailing record that were discarded, if any.
    pub truncated_bytes: usize,
}

/// Loads the log, tolerating a truncated tail.
///
/// A record cut short by a crash mid-append is discarded with a
/// warning. Anything else that fails to parse is interior corruption
/// and aborts the load.
pub fn load(path: impl AsRef<Path>) -> Result<AofLog, FormatError> {
    let data = fs::read(path.as_ref())?;
    let mut commands = Vec::new();
    let mut rest: &[u8] = &data;

    loop {
        match parse_frame(rest) {
            Ok(Some((frame, consumed))) => {
                validate_command(&frame)?;
                commands.push(frame);
                rest = &rest[consumed..];
            }
            Ok(None) => {
                // incomplete at end-of-file: a crash mid-append
                if !rest.is_empty() {
                    warn!(
                        path = %path.as_ref().display(),
                        bytes = rest.len(),
                        "discarding truncated record at log tail"
                    );
                }
                return Ok(AofLog {
                    commands,
                    truncated_bytes: rest.len(),
                });
            }
            Err(ProtocolError::Incomplete) => unreachable!("parse_frame maps Incomplete to None"),
            Err(e) => return Err(FormatError::CorruptLog(e.to_string())),
        }
    }
}

/// A logged record must be a non-empty array of bulk strings.
fn validate_command(frame: &Frame) -> Result<(), FormatError> {
    match frame {
        Frame::Array(items) if !items.is_empty() => {
            if items.iter().all(|f| matches!(f, Frame::Bulk(_))) {
                Ok(())
            } else {
                Err(FormatError::CorruptLog(
                    "command array contains a non-bulk element".into(),
                ))
            }
        }
        _ => Err(FormatError::CorruptLog(
            "record is not a non-empty command array".into(),
        )),
    }
}

/// Rewrites the log as a minimal reconstruction of the given
/// point-in-time image: per database a SELECT, then one command per
/// key (chunked for large collections), then PEXPIREAT for keys with
/// a deadline.
///
/// Writes to a temp file and atomically renames over `path`. Returns
/// the new log size.
pub fn rewrite(
    path: impl AsRef<Path>,
    databases: &[(usize, Vec<SnapEntry>)],
) -> Result<u64, FormatError> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("aof.tmp");

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    let mut writer = BufWriter::new(file);
    let mut size = 0u64;
    let mut buf = BytesMut::new();

    for (index, entries) in databases {
        if entries.is_empty() {
            continue;
        }
        buf.clear();
        select_frame(*index).serialize(&mut buf);
        for entry in entries {
            for frame in reconstruction_frames(entry) {
                frame.serialize(&mut buf);
            }
        }
        writer.write_all(&buf)?;
        size += buf.len() as u64;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);
    fs::rename(&tmp_path, path)?;
    Ok(size)
}

/// Emits the command sequence that recreates one entry.
fn reconstruction_frames(entry: &SnapEntry) -> Vec<Frame> {
    let key = Bytes::copy_from_slice(entry.key.as_bytes());
    let mut frames = Vec::new();

    match &entry.value {
        SnapValue::String(data) => {
            frames.push(command_frame([
                Bytes::from_static(b"SET"),
                key.clone(),
                data.clone(),
            ]));
        }
        SnapValue::List(items) => {
            for chunk in items.chunks(REWRITE_CHUNK) {
                let mut parts = vec![Bytes::from_static(b"RPUSH"), key.clone()];
                parts.extend(chunk.iter().cloned());
                frames.push(command_frame(parts));
            }
        }
        SnapValue::Set(members) => {
            for chunk in members.chunks(REWRITE_CHUNK) {
                let mut parts = vec![Bytes::from_static(b"SADD"), key.clone()];
                parts.extend(chunk.iter().map(|m| Bytes::copy_from_slice(m.as_bytes())));
                frames.push(command_frame(parts));
            }
        }
        SnapValue::ZSet(members) => {
            for chunk in members.chunks(REWRITE_CHUNK) {
                let mut parts = vec![Bytes::from_static(b"ZADD"), key.clone()];
                for (score, member) in chunk {
                    parts.push(Bytes::from(format_score(*score)));
                    parts.push(Bytes::copy_from_slice(member.as_bytes()));
                }
                frames.push(command_frame(parts));
            }
        }
        SnapValue::Hash(fields) => {
            for chunk in fields.chunks(REWRITE_CHUNK) {
                let mut parts = vec![Bytes::from_static(b"HSET"), key.clone()];
                for (field, value) in chunk {
                    parts.push(Bytes::copy_from_slice(field.as_bytes()));
                    parts.push(value.clone());
                }
                frames.push(command_frame(parts));
            }
        }
    }

    if let Some(at_ms) = entry.expire_at_ms {
        frames.push(command_frame([
            Bytes::from_static(b"PEXPIREAT"),
            key,
            Bytes::from(at_ms.to_string()),
        ]));
    }

    frames
}

/// Formats a score so the ZADD round-trips exactly through the command
/// parser: whole numbers lose the decimal point, infinities use the
/// `inf` spelling.
fn format_score(score: f64) -> String {
    if score == f64::INFINITY {
        "inf".into()
    } else if score == f64::NEG_INFINITY {
        "-inf".into()
    } else if score == score.trunc() && score.abs() < 1e17 {
        format!("{}", score as i64)
    } else {
        format!("{score}")
    }
}
