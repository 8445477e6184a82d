//! Startup recovery: snapshot first, then log replay on top.
//!
//! Failure semantics differ by file:
//! - a missing snapshot or log is simply skipped;
//! - a snapshot that fails its checksum (or any parse) aborts startup
//!   — silently serving partial data would be worse than refusing to
//!   start;
//! - a log with a truncated tail is usable up to the truncation point;
//!   interior corruption aborts startup.

use std::path::Path;

use tracing::info;

use crate::aof::{self, AofLog};
use crate::format::FormatError;
use crate::snapshot::{self, SnapshotImage};

/// Persisted state found on disk at startup.
#[derive(Debug)]
pub struct RecoveredState {
    /// The snapshot image, if a snapshot file existed.
    pub snapshot: Option<SnapshotImage>,
    /// The command log, if a log file existed.
    pub log: Option<AofLog>,
}

/// Loads the snapshot and append-only log from their configured paths.
pub fn recover(snapshot_path: &Path, aof_path: &Path) -> Result<RecoveredState, FormatError> {
    let snapshot = if snapshot_path.exists() {
        let image = snapshot::load(snapshot_path)?;
        let keys: usize = image.databases.iter().map(|(_, e)| e.len()).sum();
        info!(
            path = %snapshot_path.display(),
            databases = image.databases.len(),
            keys,
            "loaded snapshot"
        );
        Some(image)
    } else {
        None
    };

    let log = if aof_path.exists() {
        let log = aof::load(aof_path)?;
        info!(
            path = %aof_path.display(),
            commands = log.commands.len(),
            "loaded append-only log"
        );
        Some(log)
    } else {
        None
    };

    Ok(RecoveredState { snapshot, log })
}
