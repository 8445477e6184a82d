//! The store executor: a single task that owns every database.
//!
//! All command execution — typed mutations, expiration checks,
//! eviction, the versioned compare-and-swap behind WATCH — runs
//! serially inside this task. That single-writer discipline is what
//! makes EXEC a linearizable block and keeps the containers free of
//! locks.
//!
//! Connections talk to the executor over a bounded mpsc channel; each
//! message carries a oneshot for its reply, so callers wait only on
//! their own future. After waking, the loop drains the channel with
//! `try_recv()` before re-entering `select!`, amortizing scheduler
//! wake-ups across pipelined bursts.
//!
//! The same loop owns the persistence machinery: the append-only log
//! writer (with its fsync ticks), the active-expiration tick, the
//! periodic snapshot, and completion events from background save and
//! rewrite tasks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cinder_core::keyspace::KeyspaceConfig;
use cinder_core::{expiry, time, Databases, StoreError, Value};
use cinder_persistence::aof::{self, AofWriter, FsyncPolicy};
use cinder_persistence::recovery;
use cinder_persistence::snapshot::{SnapEntry, SnapValue, SnapshotWriter};
use cinder_persistence::FormatError;
use cinder_protocol::Frame;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::pubsub::PubSubManager;
use crate::registry::{Handler, Registry, StoreOp};
use crate::session::{QueuedCommand, Watch};

/// How often the executor runs active expiration. 100ms keeps CPU
/// overhead negligible while bounding how long a dead key can linger.
const EXPIRY_TICK: Duration = Duration::from_millis(100);

/// How often to fsync under the everysec policy.
const FSYNC_TICK: Duration = Duration::from_secs(1);

/// Command channel depth. The bounded buffer is the flow-control
/// valve: when the executor is saturated, senders queue here instead
/// of growing without limit.
const STORE_BUFFER: usize = 1024;

/// A request submitted to the executor.
#[derive(Debug)]
pub enum StoreRequest {
    /// One resolved command to run against a database.
    Command {
        db: usize,
        name: String,
        args: Vec<Bytes>,
    },
    /// Current version stamps for WATCH.
    Versions { db: usize, keys: Vec<String> },
    /// EXEC: verify the watches, then run the queue with no
    /// interleaving.
    Exec {
        db: usize,
        watches: Vec<Watch>,
        queued: Vec<QueuedCommand>,
    },
}

/// The executor's reply.
#[derive(Debug)]
pub enum StoreResponse {
    Frame(Frame),
    Versions(Vec<Option<u64>>),
    /// A watched key changed; EXEC did not run.
    ExecAborted,
    ExecReplies(Vec<Frame>),
}

struct StoreMessage {
    request: StoreRequest,
    reply: oneshot::Sender<StoreResponse>,
}

/// Completion events from background persistence tasks.
enum Maintenance {
    SnapshotDone(Result<(), String>),
    RewriteDone(Result<u64, String>),
}

/// Cloneable handle for submitting work to the executor.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreMessage>,
}

impl StoreHandle {
    async fn send(&self, request: StoreRequest) -> Result<StoreResponse, StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StoreMessage {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable)?;
        reply_rx.await.map_err(|_| StoreError::Unavailable)
    }

    /// Runs one command and returns its reply frame.
    pub async fn command(
        &self,
        db: usize,
        name: String,
        args: Vec<Bytes>,
    ) -> Result<Frame, StoreError> {
        match self.send(StoreRequest::Command { db, name, args }).await? {
            StoreResponse::Frame(frame) => Ok(frame),
            other => {
                error!("unexpected store response: {other:?}");
                Ok(Frame::Error("ERR internal error".into()))
            }
        }
    }

    /// Reads the current version stamps of `keys` for WATCH.
    pub async fn versions(
        &self,
        db: usize,
        keys: Vec<String>,
    ) -> Result<Vec<Option<u64>>, StoreError> {
        match self.send(StoreRequest::Versions { db, keys }).await? {
            StoreResponse::Versions(versions) => Ok(versions),
            other => {
                error!("unexpected store response: {other:?}");
                Err(StoreError::Unavailable)
            }
        }
    }

    /// Runs an EXEC. `None` means the optimistic check failed.
    pub async fn exec(
        &self,
        db: usize,
        watches: Vec<Watch>,
        queued: Vec<QueuedCommand>,
    ) -> Result<Option<Vec<Frame>>, StoreError> {
        match self.send(StoreRequest::Exec { db, watches, queued }).await? {
            StoreResponse::ExecAborted => Ok(None),
            StoreResponse::ExecReplies(replies) => Ok(Some(replies)),
            other => {
                error!("unexpected store response: {other:?}");
                Err(StoreError::Unavailable)
            }
        }
    }
}

/// Append-only log state owned by the executor.
struct AofState {
    writer: AofWriter,
    policy: FsyncPolicy,
    /// Log size when the last rewrite finished (or at startup); the
    /// growth-percentage trigger compares against this.
    base_size: u64,
    /// Unsynced appends pending the next everysec tick.
    dirty: bool,
    /// Records appended while a rewrite runs. The rewrite task renames
    /// over the file we're appending to, so these must be replayed
    /// into the fresh log when it lands.
    rewrite_buffer: Vec<(usize, Frame)>,
}

struct StoreState {
    databases: Databases,
    registry: Arc<Registry>,
    pubsub: Arc<PubSubManager>,
    aof: Option<AofState>,
    snapshot_path: PathBuf,
    aof_path: PathBuf,
    rewrite_percent: u64,
    rewrite_min_size: u64,
    bgsave_running: bool,
    rewrite_running: bool,
    maintenance_tx: mpsc::Sender<Maintenance>,
    started_at_ms: u64,
}

/// Builds the executor: recovers persisted state, then spawns the
/// run loop. Returns the handle the server hands to every connection.
///
/// Recovery failures are fatal — serving partial data would be worse
/// than refusing to start.
pub fn start(
    config: &Config,
    registry: Arc<Registry>,
    pubsub: Arc<PubSubManager>,
) -> Result<StoreHandle, FormatError> {
    let keyspace_config = KeyspaceConfig {
        // the configured ceiling is split evenly across databases so
        // each keyspace enforces its own share
        max_memory: config.maxmemory.map(|total| total / config.databases),
        eviction_policy: config.eviction_policy,
    };
    let mut databases = Databases::new(config.databases, keyspace_config);

    let snapshot_path = config.snapshot_path();
    let aof_path = config.aof_path();

    let (maintenance_tx, maintenance_rx) = mpsc::channel(8);

    // -- recovery: snapshot first, then the log on top --
    let recovered = recovery::recover(&snapshot_path, &aof_path)?;

    if let Some(image) = recovered.snapshot {
        for (index, entries) in image.databases {
            let Some(ks) = databases.get_mut(index) else {
                warn!(index, "snapshot refers to a database beyond the configured count");
                continue;
            };
            for entry in entries {
                ks.restore(entry.key, snap_to_value(entry.value), entry.expire_at_ms);
            }
        }
    }

    let mut state = StoreState {
        databases,
        registry,
        pubsub,
        aof: None,
        snapshot_path,
        aof_path: aof_path.clone(),
        rewrite_percent: config.aof_rewrite_percent,
        rewrite_min_size: config.aof_rewrite_min_size,
        bgsave_running: false,
        rewrite_running: false,
        maintenance_tx,
        started_at_ms: time::now_ms(),
    };

    if let Some(log) = recovered.log {
        let mut replay_db = 0usize;
        let mut replayed = 0usize;
        for frame in log.commands {
            let Some((name, args)) = split_command(&frame) else {
                return Err(FormatError::CorruptLog("unreadable command record".into()));
            };
            if name.eq_ignore_ascii_case("SELECT") {
                let db = args
                    .first()
                    .and_then(|a| std::str::from_utf8(a).ok())
                    .and_then(|s| s.parse().ok());
                match db {
                    Some(db) => replay_db = db,
                    None => {
                        return Err(FormatError::CorruptLog("bad SELECT record".into()));
                    }
                }
                continue;
            }
            // the AOF is still detached here, so replay never re-logs
            let reply = run_command(&mut state, replay_db, &name, &args);
            if let Frame::Error(msg) = reply {
                warn!(command = %name, %msg, "error replaying log record");
            }
            replayed += 1;
        }
        info!(replayed, "replayed append-only log");
    }

    // -- attach the log writer --
    if config.appendonly {
        let writer = AofWriter::open(&aof_path)?;
        let base_size = writer.size();
        state.aof = Some(AofState {
            writer,
            policy: config.appendfsync,
            base_size,
            dirty: false,
            rewrite_buffer: Vec::new(),
        });
    }

    let (tx, rx) = mpsc::channel(STORE_BUFFER);
    tokio::spawn(run_store(
        state,
        rx,
        maintenance_rx,
        config.save_interval_secs,
    ));
    Ok(StoreHandle { tx })
}

/// The executor's main loop.
async fn run_store(
    mut state: StoreState,
    mut rx: mpsc::Receiver<StoreMessage>,
    mut maintenance_rx: mpsc::Receiver<Maintenance>,
    save_interval_secs: u64,
) {
    let mut expiry_tick = tokio::time::interval(EXPIRY_TICK);
    expiry_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut fsync_tick = tokio::time::interval(FSYNC_TICK);
    fsync_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // a disabled periodic snapshot still needs a ticker for select!,
    // so park it on a day-long period and gate the body
    let save_period = if save_interval_secs > 0 {
        Duration::from_secs(save_interval_secs)
    } else {
        Duration::from_secs(24 * 60 * 60)
    };
    let mut save_tick = tokio::time::interval(save_period);
    save_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    save_tick.reset(); // don't fire immediately at startup

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        process_message(&mut state, msg);
                        // drain pending messages before re-entering
                        // select! — pipelined clients send bursts
                        while let Ok(msg) = rx.try_recv() {
                            process_message(&mut state, msg);
                        }
                        maybe_trigger_rewrite(&mut state);
                    }
                    None => break, // all connections gone, shutting down
                }
            }
            event = maintenance_rx.recv() => {
                if let Some(event) = event {
                    handle_maintenance(&mut state, event);
                }
            }
            _ = expiry_tick.tick() => {
                for (_, ks) in state.databases.iter_mut() {
                    expiry::run_expiration_cycle(ks);
                }
            }
            _ = fsync_tick.tick() => {
                if let Some(ref mut aof) = state.aof {
                    if aof.policy == FsyncPolicy::EverySec && aof.dirty {
                        if let Err(e) = aof.writer.sync() {
                            warn!("periodic aof sync failed: {e}");
                        }
                        aof.dirty = false;
                    }
                }
            }
            _ = save_tick.tick() => {
                if save_interval_secs > 0 && !state.bgsave_running {
                    start_background_save(&mut state);
                }
            }
        }
    }

    // flush the log on clean shutdown
    if let Some(ref mut aof) = state.aof {
        if let Err(e) = aof.writer.sync() {
            warn!("final aof sync failed: {e}");
        }
    }
}

fn process_message(state: &mut StoreState, msg: StoreMessage) {
    let response = match msg.request {
        StoreRequest::Command { db, name, args } => {
            StoreResponse::Frame(run_command(state, db, &name, &args))
        }
        StoreRequest::Versions { db, keys } => {
            let versions = keys
                .iter()
                .map(|key| {
                    state
                        .databases
                        .get_mut(db)
                        .and_then(|ks| ks.version(key))
                })
                .collect();
            StoreResponse::Versions(versions)
        }
        StoreRequest::Exec { db, watches, queued } => {
            let broken = watches.iter().any(|w| {
                let current = state
                    .databases
                    .get_mut(w.db)
                    .and_then(|ks| ks.version(&w.key));
                current != w.version
            });
            if broken {
                StoreResponse::ExecAborted
            } else {
                let replies = queued
                    .iter()
                    .map(|qc| run_command(state, db, &qc.name, &qc.args))
                    .collect();
                StoreResponse::ExecReplies(replies)
            }
        }
    };
    let _ = msg.reply.send(response);
}

/// Runs one command against the store. This is the hot path.
fn run_command(state: &mut StoreState, db: usize, name: &str, args: &[Bytes]) -> Frame {
    let Some(spec) = state.registry.lookup(name) else {
        return Frame::Error(format!("ERR unknown command '{name}'"));
    };

    match &spec.handler {
        Handler::Keyspace(f) => {
            let Some(ks) = state.databases.get_mut(db) else {
                return Frame::Error("ERR DB index is out of range".into());
            };
            let seq_before = ks.mutation_seq();
            let reply = f(ks, args).unwrap_or_else(|e| e);
            let dirtied = state
                .databases
                .get(db)
                .map(|ks| ks.mutation_seq() != seq_before)
                .unwrap_or(false);

            // log only commands that actually changed something —
            // a blocked SET NX or a no-op SADD must not replay
            if spec.is_write && dirtied && !matches!(reply, Frame::Error(_)) {
                if let Err(msg) = append_to_aof(state, db, name, args) {
                    return Frame::Error(msg);
                }
            }
            reply
        }
        Handler::Store(op) => run_store_op(state, db, *op, args),
        Handler::Connection => {
            // session-level commands never reach the executor
            Frame::Error(format!("ERR command '{name}' cannot run here"))
        }
    }
}

/// Appends a successful write to the log per the fsync policy.
/// Under `always`, a failed write or sync surfaces as the command's
/// reply; the in-memory mutation has already happened.
fn append_to_aof(state: &mut StoreState, db: usize, name: &str, args: &[Bytes]) -> Result<(), String> {
    let Some(ref mut aof) = state.aof else {
        return Ok(());
    };

    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(Frame::Bulk(Bytes::copy_from_slice(name.as_bytes())));
    parts.extend(args.iter().cloned().map(Frame::Bulk));
    let frame = Frame::Array(parts);

    if state.rewrite_running {
        aof.rewrite_buffer.push((db, frame.clone()));
    }

    if let Err(e) = aof.writer.append(db, &frame) {
        error!("aof append failed: {e}");
        return Err("ERR AOF write failed".into());
    }

    match aof.policy {
        FsyncPolicy::Always => {
            if let Err(e) = aof.writer.sync() {
                error!("aof fsync failed: {e}");
                return Err("ERR AOF fsync failed".into());
            }
        }
        FsyncPolicy::EverySec => aof.dirty = true,
        FsyncPolicy::No => {}
    }
    Ok(())
}

fn run_store_op(state: &mut StoreState, db: usize, op: StoreOp, args: &[Bytes]) -> Frame {
    match op {
        StoreOp::Save => {
            // both paths share the same temp file
            if state.bgsave_running {
                return Frame::Error("ERR Background save already in progress".into());
            }
            let image = freeze_image(&state.databases);
            match write_snapshot(&state.snapshot_path, &image) {
                Ok(()) => Frame::ok(),
                Err(e) => {
                    error!("SAVE failed: {e}");
                    Frame::Error(format!("ERR snapshot failed: {e}"))
                }
            }
        }
        StoreOp::BgSave => {
            if state.bgsave_running {
                return Frame::Error("ERR Background save already in progress".into());
            }
            start_background_save(state);
            Frame::Simple("Background saving started".into())
        }
        StoreOp::BgRewriteAof => {
            if state.aof.is_none() {
                return Frame::Error("ERR append only mode is not enabled".into());
            }
            if state.rewrite_running {
                return Frame::Error(
                    "ERR Background append only file rewriting already in progress".into(),
                );
            }
            start_background_rewrite(state);
            Frame::Simple("Background append only file rewriting started".into())
        }
        StoreOp::FlushAll => {
            state.databases.flush_all();
            if let Err(msg) = append_to_aof(state, db, "FLUSHALL", &[]) {
                return Frame::Error(msg);
            }
            Frame::ok()
        }
        StoreOp::Publish => {
            let Ok(channel) = std::str::from_utf8(&args[0]) else {
                return Frame::Error("ERR invalid channel name".into());
            };
            let delivered = state.pubsub.publish(channel, &args[1]);
            Frame::Integer(delivered as i64)
        }
        StoreOp::Info => info_reply(state, args),
    }
}

fn start_background_save(state: &mut StoreState) {
    let image = freeze_image(&state.databases);
    let path = state.snapshot_path.clone();
    let tx = state.maintenance_tx.clone();
    state.bgsave_running = true;
    info!("background save started");

    tokio::task::spawn_blocking(move || {
        let result = write_snapshot(&path, &image).map_err(|e| e.to_string());
        let _ = tx.blocking_send(Maintenance::SnapshotDone(result));
    });
}

fn start_background_rewrite(state: &mut StoreState) {
    let image = freeze_image(&state.databases);
    let path = state.aof_path.clone();
    let tx = state.maintenance_tx.clone();
    state.rewrite_running = true;
    if let Some(ref mut aof) = state.aof {
        aof.rewrite_buffer.clear();
    }
    info!("background aof rewrite started");

    tokio::task::spawn_blocking(move || {
        let result = aof::rewrite(&path, &image).map_err(|e| e.to_string());
        let _ = tx.blocking_send(Maintenance::RewriteDone(result));
    });
}

fn handle_maintenance(state: &mut StoreState, event: Maintenance) {
    match event {
        Maintenance::SnapshotDone(Ok(())) => {
            state.bgsave_running = false;
            info!(path = %state.snapshot_path.display(), "background save finished");
        }
        Maintenance::SnapshotDone(Err(e)) => {
            state.bgsave_running = false;
            error!("background save failed: {e}");
        }
        Maintenance::RewriteDone(result) => {
            state.rewrite_running = false;
            let buffered = match state.aof.as_mut() {
                Some(aof) => std::mem::take(&mut aof.rewrite_buffer),
                None => Vec::new(),
            };
            match result {
                Ok(_) => {
                    // reopen on the fresh file and replay everything
                    // appended while the rewrite ran
                    match AofWriter::open(&state.aof_path) {
                        Ok(writer) => {
                            if let Some(ref mut aof) = state.aof {
                                aof.writer = writer;
                                for (db, frame) in &buffered {
                                    if let Err(e) = aof.writer.append(*db, frame) {
                                        error!("aof post-rewrite append failed: {e}");
                                    }
                                }
                                if let Err(e) = aof.writer.sync() {
                                    warn!("aof post-rewrite sync failed: {e}");
                                }
                                aof.base_size = aof.writer.size();
                                aof.dirty = false;
                                info!(size = aof.base_size, "aof rewrite finished");
                            }
                        }
                        Err(e) => error!("cannot reopen aof after rewrite: {e}"),
                    }
                }
                Err(e) => {
                    // the old log (including the buffered tail) is intact
                    error!("aof rewrite failed: {e}");
                }
            }
        }
    }
}

/// Fires a rewrite when the log passed both configured thresholds.
fn maybe_trigger_rewrite(state: &mut StoreState) {
    if state.rewrite_running {
        return;
    }
    let (size, base) = match state.aof {
        Some(ref aof) => (aof.writer.size(), aof.base_size),
        None => return,
    };
    if size < state.rewrite_min_size {
        return;
    }
    let threshold = base
        .saturating_add(base / 100 * state.rewrite_percent)
        .max(state.rewrite_min_size);
    if size >= threshold {
        info!(size, base, "aof grew past rewrite threshold");
        start_background_rewrite(state);
    }
}

// ---------------------------------------------------------------------------
// snapshot plumbing
// ---------------------------------------------------------------------------

/// Clones every database into an owned image — the consistent
/// point-in-time view handed to SAVE, BGSAVE, and the rewrite. Bulk
/// payloads share their buffers, so this is proportional to key count.
fn freeze_image(databases: &Databases) -> Vec<(usize, Vec<SnapEntry>)> {
    databases
        .iter()
        .filter(|(_, ks)| !ks.is_empty())
        .map(|(index, ks)| {
            let entries = ks
                .freeze()
                .into_iter()
                .map(|(key, value, expire_at_ms)| SnapEntry {
                    key,
                    value: value_to_snap(&value),
                    expire_at_ms,
                })
                .collect();
            (index, entries)
        })
        .collect()
}

/// Writes one snapshot file from a frozen image.
fn write_snapshot(
    path: &std::path::Path,
    image: &[(usize, Vec<SnapEntry>)],
) -> Result<(), FormatError> {
    let mut writer = SnapshotWriter::create(path)?;
    writer.aux("cinder-ver", env!("CARGO_PKG_VERSION"))?;
    for (index, entries) in image {
        let expiring = entries.iter().filter(|e| e.expire_at_ms.is_some()).count();
        writer.begin_db(*index, entries.len(), expiring)?;
        for entry in entries {
            writer.write_entry(entry)?;
        }
    }
    writer.finish()
}

fn value_to_snap(value: &Value) -> SnapValue {
    match value {
        Value::String(data) => SnapValue::String(data.clone()),
        Value::List(deque) => SnapValue::List(deque.iter().cloned().collect()),
        Value::Set(set) => SnapValue::Set(set.iter().cloned().collect()),
        Value::SortedSet(ss) => {
            SnapValue::ZSet(ss.iter().map(|(m, s)| (s, m.to_owned())).collect())
        }
        Value::Hash(map) => {
            SnapValue::Hash(map.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
        }
    }
}

fn snap_to_value(value: SnapValue) -> Value {
    match value {
        SnapValue::String(data) => Value::String(data),
        SnapValue::List(items) => Value::List(items.into()),
        SnapValue::Set(members) => Value::Set(members.into_iter().collect()),
        SnapValue::ZSet(members) => {
            let mut ss = cinder_core::types::sorted_set::SortedSet::new();
            for (score, member) in members {
                ss.add(member, score);
            }
            Value::SortedSet(ss)
        }
        SnapValue::Hash(fields) => Value::Hash(fields.into_iter().collect()),
    }
}

/// Splits a logged command array into its verb and arguments.
fn split_command(frame: &Frame) -> Option<(String, Vec<Bytes>)> {
    let Frame::Array(items) = frame else {
        return None;
    };
    let mut parts = items.iter().map(|f| match f {
        Frame::Bulk(data) => Some(data.clone()),
        _ => None,
    });
    let name = parts.next()??;
    let name = String::from_utf8(name.to_vec()).ok()?;
    let args: Option<Vec<Bytes>> = parts.collect();
    Some((name, args?))
}

// ---------------------------------------------------------------------------
// INFO
// ---------------------------------------------------------------------------

fn info_reply(state: &mut StoreState, args: &[Bytes]) -> Frame {
    let section = args
        .first()
        .and_then(|a| std::str::from_utf8(a).ok())
        .map(|s| s.to_ascii_uppercase());

    let stats = state.databases.total_stats();
    let uptime_secs = time::now_ms().saturating_sub(state.started_at_ms) / 1000;

    let mut out = String::new();
    let want = |name: &str| section.is_none() || section.as_deref() == Some(name);

    if want("SERVER") {
        out.push_str(&format!(
            "# Server\r\nversion:{}\r\nuptime_in_seconds:{uptime_secs}\r\n\r\n",
            env!("CARGO_PKG_VERSION")
        ));
    }
    if want("MEMORY") {
        out.push_str(&format!(
            "# Memory\r\nused_memory:{}\r\n\r\n",
            stats.used_bytes
        ));
    }
    if want("PERSISTENCE") {
        let (aof_enabled, aof_size) = match state.aof {
            Some(ref aof) => (1, aof.writer.size()),
            None => (0, 0),
        };
        out.push_str(&format!(
            "# Persistence\r\naof_enabled:{aof_enabled}\r\naof_current_size:{aof_size}\r\n\
             rdb_bgsave_in_progress:{}\r\naof_rewrite_in_progress:{}\r\n\r\n",
            i32::from(state.bgsave_running),
            i32::from(state.rewrite_running),
        ));
    }
    if want("STATS") {
        out.push_str(&format!(
            "# Stats\r\nkeyspace_hits:{}\r\nkeyspace_misses:{}\r\nexpired_keys:{}\r\n\
             evicted_keys:{}\r\n\r\n",
            stats.hits, stats.misses, stats.keys_expired, stats.keys_evicted
        ));
    }
    if want("KEYSPACE") {
        out.push_str("# Keyspace\r\n");
        for (index, ks) in state.databases.iter() {
            let s = ks.stats();
            if s.key_count > 0 {
                out.push_str(&format!(
                    "db{index}:keys={},expires={}\r\n",
                    s.key_count, s.keys_with_expiry
                ));
            }
        }
    }

    Frame::Bulk(Bytes::from(out))
}
