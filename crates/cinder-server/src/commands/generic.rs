//! Generic key commands: existence, expiration, renaming, scanning —
//! plus the connection-agnostic PING/ECHO, which take the keyspace
//! argument only to share the handler shape.

use bytes::Bytes;
use cinder_core::{time, Keyspace, TtlResult};
use cinder_protocol::Frame;

use super::*;

pub fn ping(_ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    match args.first() {
        None => Ok(Frame::Simple("PONG".into())),
        Some(msg) => Ok(Frame::Bulk(msg.clone())),
    }
}

pub fn echo(_ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    Ok(Frame::Bulk(args[0].clone()))
}

pub fn del(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let mut removed = 0;
    for i in 0..args.len() {
        if ks.del(&str_arg(args, i)?) {
            removed += 1;
        }
    }
    Ok(Frame::Integer(removed))
}

pub fn exists(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let mut count = 0;
    for i in 0..args.len() {
        if ks.exists(&str_arg(args, i)?) {
            count += 1;
        }
    }
    Ok(Frame::Integer(count))
}

pub fn type_of(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(Frame::Simple(ks.value_type(&key).into()))
}

pub fn expire(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let seconds = int_arg(args, 1)?;
    let at_ms = time::now_ms().saturating_add_signed(seconds.saturating_mul(1000));
    Ok(Frame::Integer(i64::from(ks.expire_at_ms(&key, at_ms))))
}

pub fn pexpire(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let millis = int_arg(args, 1)?;
    let at_ms = time::now_ms().saturating_add_signed(millis);
    Ok(Frame::Integer(i64::from(ks.expire_at_ms(&key, at_ms))))
}

pub fn pexpireat(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let at_ms = int_arg(args, 1)?.max(0) as u64;
    Ok(Frame::Integer(i64::from(ks.expire_at_ms(&key, at_ms))))
}

/// TTL sentinel mapping: -2 absent, -1 persistent, otherwise remaining
/// time in the requested unit.
fn ttl_reply(result: TtlResult, in_millis: bool) -> Frame {
    match result {
        TtlResult::NotFound => Frame::Integer(-2),
        TtlResult::NoExpiry => Frame::Integer(-1),
        TtlResult::Remaining(ms) => {
            if in_millis {
                Frame::Integer(ms as i64)
            } else {
                // round up so a key with 400ms left reports 1, not 0
                Frame::Integer(ms.div_ceil(1000) as i64)
            }
        }
    }
}

pub fn ttl(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(ttl_reply(ks.ttl_ms(&key), false))
}

pub fn pttl(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(ttl_reply(ks.ttl_ms(&key), true))
}

pub fn persist(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(Frame::Integer(i64::from(ks.persist(&key))))
}

pub fn rename(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let newkey = str_arg(args, 1)?;
    ks.rename(&key, &newkey).map_err(|e| err(e.to_string()))?;
    Ok(Frame::ok())
}

pub fn keys(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let pattern = str_arg(args, 0)?;
    Ok(string_array(ks.keys(&pattern)))
}

pub fn randomkey(ks: &mut Keyspace, _args: &[Bytes]) -> CmdResult {
    Ok(bulk_or_null(ks.random_key().map(Bytes::from)))
}

pub fn dbsize(ks: &mut Keyspace, _args: &[Bytes]) -> CmdResult {
    Ok(Frame::Integer(ks.len() as i64))
}

pub fn flushdb(ks: &mut Keyspace, _args: &[Bytes]) -> CmdResult {
    ks.clear();
    Ok(Frame::ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
    }

    fn seed(ks: &mut Keyspace, key: &str, val: &str) {
        ks.set(key.into(), Bytes::copy_from_slice(val.as_bytes()), None, false, false);
    }

    #[test]
    fn ping_with_and_without_message() {
        let mut ks = Keyspace::new();
        assert_eq!(ping(&mut ks, &[]).unwrap(), Frame::Simple("PONG".into()));
        assert_eq!(
            ping(&mut ks, &args(&["hi"])).unwrap(),
            Frame::Bulk(Bytes::from_static(b"hi"))
        );
        assert_eq!(
            echo(&mut ks, &args(&["msg"])).unwrap(),
            Frame::Bulk(Bytes::from_static(b"msg"))
        );
    }

    #[test]
    fn del_counts_existing_keys() {
        let mut ks = Keyspace::new();
        seed(&mut ks, "a", "1");
        seed(&mut ks, "b", "2");
        assert_eq!(
            del(&mut ks, &args(&["a", "b", "ghost"])).unwrap(),
            Frame::Integer(2)
        );
        assert_eq!(exists(&mut ks, &args(&["a", "b"])).unwrap(), Frame::Integer(0));
    }

    #[test]
    fn exists_counts_repeats() {
        let mut ks = Keyspace::new();
        seed(&mut ks, "a", "1");
        assert_eq!(
            exists(&mut ks, &args(&["a", "a", "nope"])).unwrap(),
            Frame::Integer(2)
        );
    }

    #[test]
    fn type_reports_name() {
        let mut ks = Keyspace::new();
        seed(&mut ks, "s", "v");
        assert_eq!(type_of(&mut ks, &args(&["s"])).unwrap(), Frame::Simple("string".into()));
        assert_eq!(
            type_of(&mut ks, &args(&["nope"])).unwrap(),
            Frame::Simple("none".into())
        );
    }

    #[test]
    fn ttl_sentinels() {
        let mut ks = Keyspace::new();
        seed(&mut ks, "plain", "v");
        assert_eq!(ttl(&mut ks, &args(&["missing"])).unwrap(), Frame::Integer(-2));
        assert_eq!(ttl(&mut ks, &args(&["plain"])).unwrap(), Frame::Integer(-1));

        expire(&mut ks, &args(&["plain", "100"])).unwrap();
        match ttl(&mut ks, &args(&["plain"])).unwrap() {
            Frame::Integer(secs) => assert!((99..=100).contains(&secs)),
            other => panic!("expected integer, got {other:?}"),
        }
        match pttl(&mut ks, &args(&["plain"])).unwrap() {
            Frame::Integer(ms) => assert!(ms > 99_000 && ms <= 100_000),
            other => panic!("expected integer, got {other:?}"),
        }
    }

    #[test]
    fn expire_with_past_deadline_removes_key() {
        let mut ks = Keyspace::new();
        seed(&mut ks, "k", "v");
        assert_eq!(
            pexpireat(&mut ks, &args(&["k", "1"])).unwrap(),
            Frame::Integer(1)
        );
        assert_eq!(exists(&mut ks, &args(&["k"])).unwrap(), Frame::Integer(0));
    }

    #[test]
    fn persist_returns_one_only_when_ttl_removed() {
        let mut ks = Keyspace::new();
        seed(&mut ks, "k", "v");
        expire(&mut ks, &args(&["k", "100"])).unwrap();
        assert_eq!(persist(&mut ks, &args(&["k"])).unwrap(), Frame::Integer(1));
        assert_eq!(persist(&mut ks, &args(&["k"])).unwrap(), Frame::Integer(0));
        assert_eq!(ttl(&mut ks, &args(&["k"])).unwrap(), Frame::Integer(-1));
    }

    #[test]
    fn rename_moves_value() {
        let mut ks = Keyspace::new();
        seed(&mut ks, "old", "v");
        assert_eq!(rename(&mut ks, &args(&["old", "new"])).unwrap(), Frame::ok());
        assert_eq!(
            rename(&mut ks, &args(&["ghost", "x"])).unwrap_err(),
            Frame::Error("ERR no such key".into())
        );
    }

    #[test]
    fn keys_and_dbsize_and_flush() {
        let mut ks = Keyspace::new();
        seed(&mut ks, "user:1", "a");
        seed(&mut ks, "user:2", "b");
        seed(&mut ks, "other", "c");

        match keys(&mut ks, &args(&["user:*"])).unwrap() {
            Frame::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
        assert_eq!(dbsize(&mut ks, &[]).unwrap(), Frame::Integer(3));

        flushdb(&mut ks, &[]).unwrap();
        assert_eq!(dbsize(&mut ks, &[]).unwrap(), Frame::Integer(0));
        assert_eq!(randomkey(&mut ks, &[]).unwrap(), Frame::Null);
    }
}
