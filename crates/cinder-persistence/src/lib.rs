//! cinder-persistence: durable state for the keyspace.
//!
//! Two file formats live here:
//!
//! - **Snapshot** (`dump.rdb`): a self-describing whole-server binary
//!   dump with per-database sections and a CRC-64 footer.
//! - **Append-only log** (`appendonly.aof`): mutating commands in
//!   their RESP array encoding, interleaved with `SELECT` markers so
//!   replay reconstructs every database.
//!
//! Both formats write to a temporary file and rename atomically on
//! completion, so a crash mid-write never corrupts the previous file.

pub mod aof;
pub mod format;
pub mod recovery;
pub mod snapshot;

pub use format::FormatError;
