//! Sorted-set command handlers.

use bytes::Bytes;
use cinder_core::Keyspace;
use cinder_protocol::Frame;

use super::*;

pub fn zadd(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    if args.len() < 3 || (args.len() - 1) % 2 != 0 {
        return Err(err("ERR syntax error"));
    }
    let mut members = Vec::with_capacity((args.len() - 1) / 2);
    let mut i = 1;
    while i < args.len() {
        let score = float_arg(args, i)?;
        let member = str_arg(args, i + 1)?;
        members.push((score, member));
        i += 2;
    }
    let added = ks.zadd(&key, &members).map_err(write_error_frame)?;
    Ok(Frame::Integer(added as i64))
}

pub fn zrem(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let members = str_args(args, 1)?;
    let removed = ks.zrem(&key, &members).map_err(wrongtype_frame)?;
    Ok(Frame::Integer(removed as i64))
}

pub fn zscore(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let member = str_arg(args, 1)?;
    let score = ks.zscore(&key, &member).map_err(wrongtype_frame)?;
    Ok(bulk_or_null(score.map(|s| Bytes::from(format_score(s)))))
}

pub fn zcard(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(Frame::Integer(ks.zcard(&key).map_err(wrongtype_frame)? as i64))
}

pub fn zrank(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    rank(ks, args, false)
}

pub fn zrevrank(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    rank(ks, args, true)
}

fn rank(ks: &mut Keyspace, args: &[Bytes], reverse: bool) -> CmdResult {
    let key = str_arg(args, 0)?;
    let member = str_arg(args, 1)?;
    match ks.zrank(&key, &member, reverse).map_err(wrongtype_frame)? {
        Some(rank) => Ok(Frame::Integer(rank as i64)),
        None => Ok(Frame::Null),
    }
}

pub fn zrange(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    range_by_rank(ks, args, false)
}

pub fn zrevrange(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    range_by_rank(ks, args, true)
}

fn range_by_rank(ks: &mut Keyspace, args: &[Bytes], reverse: bool) -> CmdResult {
    let key = str_arg(args, 0)?;
    let start = int_arg(args, 1)?;
    let stop = int_arg(args, 2)?;
    let with_scores = parse_withscores(args, 3)?;

    let items = ks
        .zrange(&key, start, stop, reverse)
        .map_err(wrongtype_frame)?;
    Ok(scored_reply(items, with_scores))
}

pub fn zrangebyscore(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let min = score_bound_arg(args, 1)?;
    let max = score_bound_arg(args, 2)?;
    let with_scores = parse_withscores(args, 3)?;

    let items = ks
        .zrange_by_score(&key, min, max)
        .map_err(wrongtype_frame)?;
    Ok(scored_reply(items, with_scores))
}

pub fn zcount(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let min = score_bound_arg(args, 1)?;
    let max = score_bound_arg(args, 2)?;
    let count = ks.zcount(&key, min, max).map_err(wrongtype_frame)?;
    Ok(Frame::Integer(count as i64))
}

pub fn zincrby(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let delta = float_arg(args, 1)?;
    let member = str_arg(args, 2)?;
    let score = ks
        .zincrby(&key, delta, &member)
        .map_err(incr_float_error_frame)?;
    Ok(Frame::Bulk(Bytes::from(format_score(score))))
}

/// The trailing optional WITHSCORES token.
fn parse_withscores(args: &[Bytes], index: usize) -> Result<bool, Frame> {
    match args.get(index) {
        None => Ok(false),
        Some(token) if token.eq_ignore_ascii_case(b"WITHSCORES") => Ok(true),
        Some(_) => Err(err("ERR syntax error")),
    }
}

/// Renders a scored range, interleaving member and score when asked.
fn scored_reply(items: Vec<(String, f64)>, with_scores: bool) -> Frame {
    let mut out = Vec::with_capacity(if with_scores { items.len() * 2 } else { items.len() });
    for (member, score) in items {
        out.push(Frame::Bulk(Bytes::from(member)));
        if with_scores {
            out.push(Frame::Bulk(Bytes::from(format_score(score))));
        }
    }
    Frame::Array(out)
}

/// Score formatting for replies: whole numbers drop the decimal point.
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
