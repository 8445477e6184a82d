//! Hash command handlers.

use bytes::Bytes;
use cinder_core::keyspace::IncrError;
use cinder_core::Keyspace;
use cinder_protocol::Frame;

use super::*;

pub fn hset(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    if args.len() % 2 != 1 {
        return Err(wrong_arity("HSET"));
    }
    let mut fields = Vec::with_capacity((args.len() - 1) / 2);
    let mut i = 1;
    while i < args.len() {
        fields.push((str_arg(args, i)?, args[i + 1].clone()));
        i += 2;
    }
    let added = ks.hset(&key, &fields).map_err(write_error_frame)?;
    Ok(Frame::Integer(added as i64))
}

pub fn hsetnx(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let field = str_arg(args, 1)?;
    let set = ks
        .hsetnx(&key, &field, args[2].clone())
        .map_err(write_error_frame)?;
    Ok(Frame::Integer(i64::from(set)))
}

pub fn hget(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let field = str_arg(args, 1)?;
    Ok(bulk_or_null(ks.hget(&key, &field).map_err(wrongtype_frame)?))
}

pub fn hdel(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let fields = str_args(args, 1)?;
    let removed = ks.hdel(&key, &fields).map_err(wrongtype_frame)?;
    Ok(Frame::Integer(removed as i64))
}

pub fn hexists(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let field = str_arg(args, 1)?;
    let present = ks.hexists(&key, &field).map_err(wrongtype_frame)?;
    Ok(Frame::Integer(i64::from(present)))
}

pub fn hlen(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(Frame::Integer(ks.hlen(&key).map_err(wrongtype_frame)? as i64))
}

pub fn hgetall(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let pairs = ks.hgetall(&key).map_err(wrongtype_frame)?;
    let mut items = Vec::with_capacity(pairs.len() * 2);
    for (field, value) in pairs {
        items.push(Frame::Bulk(Bytes::from(field)));
        items.push(Frame::Bulk(value));
    }
    Ok(Frame::Array(items))
}

pub fn hkeys(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(string_array(ks.hkeys(&key).map_err(wrongtype_frame)?))
}

pub fn hvals(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(bulk_array(ks.hvals(&key).map_err(wrongtype_frame)?))
}

pub fn hincrby(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let field = str_arg(args, 1)?;
    let delta = int_arg(args, 2)?;
    let val = ks.hincrby(&key, &field, delta).map_err(|e| match e {
        // the hash-specific wording for a non-numeric field value
        IncrError::NotAnInteger => err("ERR hash value is not an integer"),
        other => incr_error_frame(other),
    })?;
    Ok(Frame::Integer(val))
}
