//! String command handlers: GET, SET, INCR family, APPEND, STRLEN.

use bytes::Bytes;
use cinder_core::keyspace::SetOutcome;
use cinder_core::{time, Keyspace};
use cinder_protocol::Frame;

use super::*;

pub fn get(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let value = ks.get_string(&key).map_err(wrongtype_frame)?;
    Ok(bulk_or_null(value))
}

/// SET key value [EX seconds | PX milliseconds] [NX | XX], options in
/// any order.
pub fn set(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let value = args[1].clone();

    let mut expires_at_ms = None;
    let mut nx = false;
    let mut xx = false;

    let mut i = 2;
    while i < args.len() {
        let opt = str_arg(args, i)?.to_ascii_uppercase();
        match opt.as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            "EX" | "PX" => {
                if i + 1 >= args.len() {
                    return Err(err("ERR syntax error"));
                }
                let amount = int_arg(args, i + 1)?;
                if amount <= 0 {
                    return Err(err("ERR invalid expire time in 'set' command"));
                }
                let millis = if opt == "EX" {
                    (amount as u64).saturating_mul(1000)
                } else {
                    amount as u64
                };
                expires_at_ms = Some(time::now_ms().saturating_add(millis));
                i += 1;
            }
            _ => return Err(err("ERR syntax error")),
        }
        i += 1;
    }

    if nx && xx {
        return Err(err("ERR syntax error"));
    }

    match ks.set(key, value, expires_at_ms, nx, xx) {
        SetOutcome::Done => Ok(Frame::ok()),
        SetOutcome::Blocked => Ok(Frame::Null),
        SetOutcome::OutOfMemory => Err(err(
            "OOM command not allowed when used memory > 'maxmemory'",
        )),
    }
}

pub fn incr(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let val = ks.incr_by(&key, 1).map_err(incr_error_frame)?;
    Ok(Frame::Integer(val))
}

pub fn decr(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let val = ks.incr_by(&key, -1).map_err(incr_error_frame)?;
    Ok(Frame::Integer(val))
}

pub fn incrby(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let delta = int_arg(args, 1)?;
    let val = ks.incr_by(&key, delta).map_err(incr_error_frame)?;
    Ok(Frame::Integer(val))
}

pub fn decrby(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let delta = int_arg(args, 1)?;
    let delta = delta
        .checked_neg()
        .ok_or_else(|| err("ERR increment or decrement would overflow"))?;
    let val = ks.incr_by(&key, delta).map_err(incr_error_frame)?;
    Ok(Frame::Integer(val))
}

pub fn incrbyfloat(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let delta = float_arg(args, 1)?;
    let formatted = ks
        .incr_by_float(&key, delta)
        .map_err(incr_float_error_frame)?;
    Ok(Frame::Bulk(Bytes::from(formatted)))
}

pub fn append(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let len = ks.append(&key, &args[1]).map_err(write_error_frame)?;
    Ok(Frame::Integer(len as i64))
}

pub fn strlen(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let len = ks.strlen(&key).map_err(wrongtype_frame)?;
    Ok(Frame::Integer(len as i64))
}
