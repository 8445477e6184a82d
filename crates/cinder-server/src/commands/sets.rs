//! Set command handlers.

use bytes::Bytes;
use cinder_core::Keyspace;
use cinder_protocol::Frame;

use super::*;

pub fn sadd(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let members = str_args(args, 1)?;
    let added = ks.sadd(&key, &members).map_err(write_error_frame)?;
    Ok(Frame::Integer(added as i64))
}

pub fn srem(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let members = str_args(args, 1)?;
    let removed = ks.srem(&key, &members).map_err(wrongtype_frame)?;
    Ok(Frame::Integer(removed as i64))
}

pub fn smembers(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(string_array(ks.smembers(&key).map_err(wrongtype_frame)?))
}

pub fn sismember(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let member = str_arg(args, 1)?;
    let present = ks.sismember(&key, &member).map_err(wrongtype_frame)?;
    Ok(Frame::Integer(i64::from(present)))
}

pub fn scard(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(Frame::Integer(ks.scard(&key).map_err(wrongtype_frame)? as i64))
}

/// SRANDMEMBER key [count]. Without a count: one member as a bulk (or
/// null). With a count: an array, repeats allowed when negative.
pub fn srandmember(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    match args.len() {
        1 => {
            let mut members = ks.srandmember(&key, 1).map_err(wrongtype_frame)?;
            Ok(bulk_or_null(members.pop().map(Bytes::from)))
        }
        _ => {
            let count = int_arg(args, 1)?;
            let members = ks.srandmember(&key, count).map_err(wrongtype_frame)?;
            Ok(string_array(members))
        }
    }
}

/// SPOP key [count]. Same single-vs-array reply split as SRANDMEMBER.
pub fn spop(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    match args.len() {
        1 => {
            let mut popped = ks.spop(&key, 1).map_err(wrongtype_frame)?;
            Ok(bulk_or_null(popped.pop().map(Bytes::from)))
        }
        _ => {
            let count = int_arg(args, 1)?;
            if count < 0 {
                return Err(err("ERR value is out of range, must be positive"));
            }
            let popped = ks.spop(&key, count as usize).map_err(wrongtype_frame)?;
            Ok(string_array(popped))
        }
    }
}

pub fn sinter(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let others = str_args(args, 1)?;
    Ok(string_array(
        ks.sinter(&key, &others).map_err(wrongtype_frame)?,
    ))
}

pub fn sunion(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let others = str_args(args, 1)?;
    Ok(string_array(
        ks.sunion(&key, &others).map_err(wrongtype_frame)?,
    ))
}

pub fn sdiff(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let others = str_args(args, 1)?;
    Ok(string_array(
        ks.sdiff(&key, &others).map_err(wrongtype_frame)?,
    ))
}

pub fn smove(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let src = str_arg(args, 0)?;
    let dst = str_arg(args, 1)?;
    let member = str_arg(args, 2)?;
    let moved = ks.smove(&src, &dst, &member).map_err(write_error_frame)?;
    Ok(Frame::Integer(i64::from(moved)))
}
