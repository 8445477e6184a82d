//! Per-connection session loop.
//!
//! Reads RESP frames from the socket, walks them through the dispatch
//! steps (framing check, registry lookup, arity, transaction queueing,
//! subscriber-mode restriction), and writes replies. Pipelined frames
//! in one read are processed back-to-back and answered in one write.
//!
//! The loop also owns the connection's pub/sub delivery queue: the
//! broker pushes rendered message frames into an unbounded channel and
//! the select! below forwards them to the socket between reads.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use cinder_protocol::{parse_frame, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::registry::Handler;
use crate::server::ServerContext;
use crate::session::{QueuedCommand, Session, TxnPhase, Watch};

/// Initial buffer capacity; covers typical commands without
/// reallocation.
const BUF_CAPACITY: usize = 4096;

/// Hard cap on the read buffer. A bulk string may legally be 512 MiB;
/// anything past that plus framing slack means a runaway client.
const MAX_BUF_SIZE: usize = 512 * 1024 * 1024 + 4096;

/// Whether the session keeps running after a dispatch.
enum Flow {
    Continue,
    Close,
}

/// Drives a single client connection to completion.
pub async fn handle(
    mut stream: TcpStream,
    ctx: Arc<ServerContext>,
    conn_id: u64,
) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(BUF_CAPACITY);
    let mut out = BytesMut::with_capacity(BUF_CAPACITY);
    let mut session = Session::new();
    let (delivery_tx, mut delivery_rx) = mpsc::unbounded_channel::<Bytes>();

    let idle_timeout = (ctx.config.timeout_secs > 0)
        .then(|| std::time::Duration::from_secs(ctx.config.timeout_secs));

    'outer: loop {
        out.clear();

        tokio::select! {
            read = read_some(&mut stream, &mut buf, idle_timeout) => {
                match read {
                    ReadOutcome::Data => {}
                    ReadOutcome::Closed => break 'outer,
                    ReadOutcome::IdleTimeout => {
                        debug!(conn_id, "closing idle connection");
                        break 'outer;
                    }
                    ReadOutcome::Error(e) => {
                        teardown(&ctx, conn_id, &session);
                        return Err(e);
                    }
                }

                if buf.len() > MAX_BUF_SIZE {
                    Frame::Error("ERR Protocol error: request too large".into())
                        .serialize(&mut out);
                    let _ = stream.write_all(&out).await;
                    break 'outer;
                }

                // drain every complete frame (pipelining), answering
                // into one write buffer
                loop {
                    match parse_frame(&buf) {
                        Ok(Some((frame, consumed))) => {
                            let _ = buf.split_to(consumed);
                            let flow = dispatch(
                                frame,
                                &mut session,
                                &ctx,
                                conn_id,
                                &delivery_tx,
                                &mut out,
                            )
                            .await;
                            if matches!(flow, Flow::Close) {
                                let _ = stream.write_all(&out).await;
                                break 'outer;
                            }
                        }
                        Ok(None) => break, // need more data
                        Err(e) => {
                            // a malformed byte desynchronizes the
                            // connection: report and close
                            Frame::Error(format!("ERR Protocol error: {e}")).serialize(&mut out);
                            let _ = stream.write_all(&out).await;
                            break 'outer;
                        }
                    }
                }
            }
            delivery = delivery_rx.recv() => {
                if let Some(bytes) = delivery {
                    out.extend_from_slice(&bytes);
                    while let Ok(more) = delivery_rx.try_recv() {
                        out.extend_from_slice(&more);
                    }
                }
            }
        }

        if !out.is_empty() {
            if let Err(e) = stream.write_all(&out).await {
                teardown(&ctx, conn_id, &session);
                return Err(e);
            }
        }
    }

    teardown(&ctx, conn_id, &session);
    Ok(())
}

/// Unconditionally removes the connection's subscriptions. Transaction
/// state simply drops with the session.
fn teardown(ctx: &ServerContext, conn_id: u64, session: &Session) {
    ctx.pubsub
        .remove_connection(conn_id, &session.channels, &session.patterns);
}

enum ReadOutcome {
    Data,
    Closed,
    IdleTimeout,
    Error(std::io::Error),
}

async fn read_some(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    idle_timeout: Option<std::time::Duration>,
) -> ReadOutcome {
    let read = stream.read_buf(buf);
    let result = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, read).await {
            Ok(result) => result,
            Err(_) => return ReadOutcome::IdleTimeout,
        },
        None => read.await,
    };
    match result {
        Ok(0) => ReadOutcome::Closed,
        Ok(_) => ReadOutcome::Data,
        Err(e) => ReadOutcome::Error(e),
    }
}

/// Walks one frame through the dispatch steps and serializes the reply.
async fn dispatch(
    frame: Frame,
    session: &mut Session,
    ctx: &Arc<ServerContext>,
    conn_id: u64,
    delivery_tx: &mpsc::UnboundedSender<Bytes>,
    out: &mut BytesMut,
) -> Flow {
    // step 1: the request must be a non-empty array of bulk strings
    let Some((name, args)) = split_request(frame) else {
        Frame::Error("ERR Protocol error: expected a command array".into()).serialize(out);
        return Flow::Close;
    };
    // the verb is client-controlled and gets echoed inside error
    // strings; escape it so a stray CRLF can't corrupt the reply stream
    let name: String = name.escape_default().collect();
    let name_upper = name.to_ascii_uppercase();
    let spec = ctx.registry.lookup(&name_upper);

    // queueing phase: everything but the transaction controls is
    // validated, queued, and answered QUEUED
    if session.txn != TxnPhase::None {
        match spec {
            None => {
                session.txn = TxnPhase::Discarded;
                Frame::Error(format!("ERR unknown command '{name}'")).serialize(out);
                return Flow::Continue;
            }
            Some(spec) if !spec.txn_control => {
                if !spec.arity_ok(args.len()) {
                    session.txn = TxnPhase::Discarded;
                    Frame::Error(format!(
                        "ERR wrong number of arguments for '{}' command",
                        name_upper.to_ascii_lowercase()
                    ))
                    .serialize(out);
                    return Flow::Continue;
                }
                if spec.no_txn {
                    session.txn = TxnPhase::Discarded;
                    Frame::Error(format!("ERR {name_upper} is not allowed in transactions"))
                        .serialize(out);
                    return Flow::Continue;
                }
                session.queue.push(QueuedCommand {
                    name: name_upper,
                    args,
                });
                Frame::Simple("QUEUED".into()).serialize(out);
                return Flow::Continue;
            }
            Some(_) => {} // transaction controls fall through
        }
    }

    // steps 2 and 3: known command, correct arity
    let Some(spec) = spec else {
        Frame::Error(format!("ERR unknown command '{name}'")).serialize(out);
        return Flow::Continue;
    };
    if !spec.arity_ok(args.len()) {
        Frame::Error(format!(
            "ERR wrong number of arguments for '{}' command",
            name_upper.to_ascii_lowercase()
        ))
        .serialize(out);
        return Flow::Continue;
    }

    // step 5: subscriber mode shrinks the command surface
    if session.in_subscriber_mode() && !spec.pubsub_ok {
        Frame::Error(
            "ERR only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT allowed in this context".into(),
        )
        .serialize(out);
        return Flow::Continue;
    }

    // step 6: execute
    match spec.handler {
        Handler::Connection => {
            connection_command(&name_upper, args, session, ctx, conn_id, delivery_tx, out).await
        }
        Handler::Keyspace(_) | Handler::Store(_) => {
            let reply = match ctx.store.command(session.db, name_upper, args).await {
                Ok(frame) => frame,
                Err(e) => Frame::Error(format!("ERR {e}")),
            };
            reply.serialize(out);
            Flow::Continue
        }
    }
}

/// Validates the outer request shape and splits verb from arguments.
fn split_request(frame: Frame) -> Option<(String, Vec<Bytes>)> {
    let Frame::Array(items) = frame else {
        return None;
    };
    if items.is_empty() {
        return None;
    }
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Frame::Bulk(data) => parts.push(data),
            _ => return None,
        }
    }
    let name = String::from_utf8_lossy(&parts[0]).into_owned();
    let args = parts.split_off(1);
    Some((name, args))
}

/// Commands that live entirely in the session: SELECT/QUIT, the
/// transaction controls, and the subscribe family.
async fn connection_command(
    name: &str,
    args: Vec<Bytes>,
    session: &mut Session,
    ctx: &Arc<ServerContext>,
    conn_id: u64,
    delivery_tx: &mpsc::UnboundedSender<Bytes>,
    out: &mut BytesMut,
) -> Flow {
    match name {
        "SELECT" => {
            let index = std::str::from_utf8(&args[0])
                .ok()
                .and_then(|s| s.parse::<usize>().ok());
            match index {
                Some(index) if index < ctx.config.databases => {
                    session.db = index;
                    Frame::ok().serialize(out);
                }
                Some(_) => {
                    Frame::Error("ERR DB index is out of range".into()).serialize(out);
                }
                None => {
                    Frame::Error("ERR value is not an integer or out of range".into())
                        .serialize(out);
                }
            }
            Flow::Continue
        }

        "QUIT" => {
            Frame::ok().serialize(out);
            Flow::Close
        }

        "MULTI" => {
            if session.txn != TxnPhase::None {
                Frame::Error("ERR MULTI calls can not be nested".into()).serialize(out);
            } else {
                session.txn = TxnPhase::Queuing;
                session.queue.clear();
                Frame::ok().serialize(out);
            }
            Flow::Continue
        }

        "DISCARD" => {
            if session.txn == TxnPhase::None {
                Frame::Error("ERR DISCARD without MULTI".into()).serialize(out);
            } else {
                session.reset_txn();
                Frame::ok().serialize(out);
            }
            Flow::Continue
        }

        "EXEC" => {
            match session.txn {
                TxnPhase::None => {
                    Frame::Error("ERR EXEC without MULTI".into()).serialize(out);
                }
                TxnPhase::Discarded => {
                    session.reset_txn();
                    Frame::Error(
                        "EXECABORT Transaction discarded because of previous errors.".into(),
                    )
                    .serialize(out);
                }
                TxnPhase::Queuing => {
                    let watches = std::mem::take(&mut session.watches);
                    let queued = std::mem::take(&mut session.queue);
                    session.txn = TxnPhase::None;
                    match ctx.store.exec(session.db, watches, queued).await {
                        Ok(Some(replies)) => Frame::Array(replies).serialize(out),
                        Ok(None) => Frame::NullArray.serialize(out),
                        Err(e) => Frame::Error(format!("ERR {e}")).serialize(out),
                    }
                }
            }
            Flow::Continue
        }

        "WATCH" => {
            if session.txn != TxnPhase::None {
                Frame::Error("ERR WATCH inside MULTI is not allowed".into()).serialize(out);
                return Flow::Continue;
            }
            let mut keys = Vec::with_capacity(args.len());
            for arg in &args {
                match String::from_utf8(arg.to_vec()) {
                    Ok(key) => keys.push(key),
                    Err(_) => {
                        Frame::Error("ERR invalid argument: not valid utf-8".into())
                            .serialize(out);
                        return Flow::Continue;
                    }
                }
            }
            match ctx.store.versions(session.db, keys.clone()).await {
                Ok(versions) => {
                    for (key, version) in keys.into_iter().zip(versions) {
                        session.watches.push(Watch {
                            db: session.db,
                            key,
                            version,
                        });
                    }
                    Frame::ok().serialize(out);
                }
                Err(e) => Frame::Error(format!("ERR {e}")).serialize(out),
            }
            Flow::Continue
        }

        "UNWATCH" => {
            session.watches.clear();
            Frame::ok().serialize(out);
            Flow::Continue
        }

        "SUBSCRIBE" => {
            for arg in &args {
                let channel = String::from_utf8_lossy(arg).into_owned();
                if session.channels.insert(channel.clone()) {
                    ctx.pubsub.subscribe(&channel, conn_id, delivery_tx.clone());
                }
                subscription_reply("subscribe", &channel, session.subscription_count())
                    .serialize(out);
            }
            Flow::Continue
        }

        "UNSUBSCRIBE" => {
            let targets: Vec<String> = if args.is_empty() {
                session.channels.iter().cloned().collect()
            } else {
                args.iter()
                    .map(|a| String::from_utf8_lossy(a).into_owned())
                    .collect()
            };
            if targets.is_empty() {
                null_subscription_reply("unsubscribe").serialize(out);
                return Flow::Continue;
            }
            for channel in targets {
                if session.channels.remove(&channel) {
                    ctx.pubsub.unsubscribe(&channel, conn_id);
                }
                subscription_reply("unsubscribe", &channel, session.subscription_count())
                    .serialize(out);
            }
            Flow::Continue
        }

        "PSUBSCRIBE" => {
            for arg in &args {
                let pattern = String::from_utf8_lossy(arg).into_owned();
                if session.patterns.contains(&pattern) {
                    subscription_reply("psubscribe", &pattern, session.subscription_count())
                        .serialize(out);
                    continue;
                }
                if !ctx.pubsub.psubscribe(&pattern, conn_id, delivery_tx.clone()) {
                    Frame::Error("ERR pattern is too long".into()).serialize(out);
                    continue;
                }
                session.patterns.insert(pattern.clone());
                subscription_reply("psubscribe", &pattern, session.subscription_count())
                    .serialize(out);
            }
            Flow::Continue
        }

        "PUNSUBSCRIBE" => {
            let targets: Vec<String> = if args.is_empty() {
                session.patterns.iter().cloned().collect()
            } else {
                args.iter()
                    .map(|a| String::from_utf8_lossy(a).into_owned())
                    .collect()
            };
            if targets.is_empty() {
                null_subscription_reply("punsubscribe").serialize(out);
                return Flow::Continue;
            }
            for pattern in targets {
                if session.patterns.remove(&pattern) {
                    ctx.pubsub.punsubscribe(&pattern, conn_id);
                }
                subscription_reply("punsubscribe", &pattern, session.subscription_count())
                    .serialize(out);
            }
            Flow::Continue
        }

        other => {
            Frame::Error(format!("ERR unknown command '{other}'")).serialize(out);
            Flow::Continue
        }
    }
}

/// Builds the `[kind, name, remaining]` confirmation array. The
/// remaining count spans channels and patterns together.
fn subscription_reply(kind: &str, name: &str, remaining: usize) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(Bytes::copy_from_slice(kind.as_bytes())),
        Frame::Bulk(Bytes::copy_from_slice(name.as_bytes())),
        Frame::Integer(remaining as i64),
    ])
}

/// The confirmation for an argument-less unsubscribe when nothing was
/// held: a null name and a zero count.
fn null_subscription_reply(kind: &str) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(Bytes::copy_from_slice(kind.as_bytes())),
        Frame::Null,
        Frame::Integer(0),
    ])
}
