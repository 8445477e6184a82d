//! Command handlers.
//!
//! Every handler has the same pure shape: `(keyspace, args) -> reply`.
//! The arguments arrive arity-checked by the dispatcher; handlers
//! still validate argument *values* (integers, scores, options) and
//! surface the canonical error strings. Handlers never touch the
//! transport — the session loop owns reply writing.

pub mod generic;
pub mod hashes;
pub mod lists;
pub mod sets;
pub mod strings;
pub mod zsets;

use bytes::Bytes;
use cinder_core::keyspace::{IncrError, IncrFloatError, WriteError, WrongType};
use cinder_core::ScoreBound;
use cinder_protocol::Frame;

/// Handler result: `Err` carries a ready-to-send error frame so `?`
/// reads naturally through argument parsing.
pub type CmdResult = Result<Frame, Frame>;

/// Builds an error frame.
pub(crate) fn err(msg: impl Into<String>) -> Frame {
    Frame::Error(msg.into())
}

/// Decodes an argument as a UTF-8 string (keys, members, fields).
pub(crate) fn str_arg(args: &[Bytes], index: usize) -> Result<String, Frame> {
    String::from_utf8(args[index].to_vec())
        .map_err(|_| err("ERR invalid argument: not valid utf-8"))
}

/// Decodes every argument from `from` onward as UTF-8 strings.
pub(crate) fn str_args(args: &[Bytes], from: usize) -> Result<Vec<String>, Frame> {
    (from..args.len()).map(|i| str_arg(args, i)).collect()
}

/// Parses an argument as a signed 64-bit integer.
pub(crate) fn int_arg(args: &[Bytes], index: usize) -> Result<i64, Frame> {
    std::str::from_utf8(&args[index])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| err("ERR value is not an integer or out of range"))
}

/// Parses an argument as a float score.
pub(crate) fn float_arg(args: &[Bytes], index: usize) -> Result<f64, Frame> {
    parse_score(&args[index]).ok_or_else(|| err("ERR value is not a valid float"))
}

/// Parses a score string, accepting the `inf`/`+inf`/`-inf` spellings.
pub(crate) fn parse_score(data: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(data).ok()?;
    match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        _ => s.parse().ok().filter(|f: &f64| !f.is_nan()),
    }
}

/// Parses a ZRANGEBYSCORE/ZCOUNT interval endpoint: a score, an
/// infinity, or a `(`-prefixed exclusive score.
pub(crate) fn score_bound_arg(args: &[Bytes], index: usize) -> Result<ScoreBound, Frame> {
    let data = &args[index];
    let bad = || err("ERR min or max is not a float");
    if let Some(rest) = data.strip_prefix(b"(") {
        let score = parse_score(rest).ok_or_else(bad)?;
        return Ok(ScoreBound::Excl(score));
    }
    match parse_score(data).ok_or_else(bad)? {
        f64::INFINITY => Ok(ScoreBound::PosInf),
        f64::NEG_INFINITY => Ok(ScoreBound::NegInf),
        score => Ok(ScoreBound::Incl(score)),
    }
}

/// A bulk reply, or null bulk for `None`.
pub(crate) fn bulk_or_null(value: Option<Bytes>) -> Frame {
    match value {
        Some(data) => Frame::Bulk(data),
        None => Frame::Null,
    }
}

/// An array of bulk strings.
pub(crate) fn bulk_array(items: impl IntoIterator<Item = Bytes>) -> Frame {
    Frame::Array(items.into_iter().map(Frame::Bulk).collect())
}

/// An array of bulk strings built from UTF-8 members.
pub(crate) fn string_array(items: impl IntoIterator<Item = String>) -> Frame {
    bulk_array(items.into_iter().map(Bytes::from))
}

/// Canonical wrong-number-of-arguments error.
pub(crate) fn wrong_arity(name: &str) -> Frame {
    err(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

// Keyspace error types map onto their canonical error frames through
// these adapters; handlers chain them with `.map_err(...)?`.

pub(crate) fn wrongtype_frame(e: WrongType) -> Frame {
    err(e.to_string())
}

pub(crate) fn write_error_frame(e: WriteError) -> Frame {
    err(e.to_string())
}

pub(crate) fn incr_error_frame(e: IncrError) -> Frame {
    err(e.to_string())
}

pub(crate) fn incr_float_error_frame(e: IncrFloatError) -> Frame {
    err(e.to_string())
}
