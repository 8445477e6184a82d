//! List command handlers.

use bytes::Bytes;
use cinder_core::Keyspace;
use cinder_protocol::Frame;

use super::*;

pub fn lpush(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    push(ks, args, true)
}

pub fn rpush(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    push(ks, args, false)
}

fn push(ks: &mut Keyspace, args: &[Bytes], left: bool) -> CmdResult {
    let key = str_arg(args, 0)?;
    let values = &args[1..];
    let len = if left {
        ks.lpush(&key, values)
    } else {
        ks.rpush(&key, values)
    }
    .map_err(write_error_frame)?;
    Ok(Frame::Integer(len as i64))
}

pub fn lpop(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(bulk_or_null(ks.lpop(&key).map_err(wrongtype_frame)?))
}

pub fn rpop(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(bulk_or_null(ks.rpop(&key).map_err(wrongtype_frame)?))
}

pub fn lrange(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let start = int_arg(args, 1)?;
    let stop = int_arg(args, 2)?;
    let items = ks.lrange(&key, start, stop).map_err(wrongtype_frame)?;
    Ok(bulk_array(items))
}

pub fn llen(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    Ok(Frame::Integer(ks.llen(&key).map_err(wrongtype_frame)? as i64))
}

pub fn lindex(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let index = int_arg(args, 1)?;
    Ok(bulk_or_null(
        ks.lindex(&key, index).map_err(wrongtype_frame)?,
    ))
}

pub fn lset(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let index = int_arg(args, 1)?;
    ks.lset(&key, index, args[2].clone())
        .map_err(|e| err(e.to_string()))?;
    Ok(Frame::ok())
}

pub fn ltrim(ks: &mut Keyspace, args: &[Bytes]) -> CmdResult {
    let key = str_arg(args, 0)?;
    let start = int_arg(args, 1)?;
    let stop = int_arg(args, 2)?;
    ks.ltrim(&key, start, stop).map_err(wrongtype_frame)?;
    Ok(Frame::ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
    }

    #[test]
    fn push_pop_range() {
        let mut ks = Keyspace::new();
        assert_eq!(
            rpush(&mut ks, &args(&["l", "a", "b", "c"])).unwrap(),
            Frame::Integer(3)
        );
        assert_eq!(lpush(&mut ks, &args(&["l", "z"])).unwrap(), Frame::Integer(4));

        assert_eq!(
            lrange(&mut ks, &args(&["l", "0", "-1"])).unwrap(),
            Frame::Array(vec![
                Frame::Bulk(Bytes::from_static(b"z")),
                Frame::Bulk(Bytes::from_static(b"a")),
                Frame::Bulk(Bytes::from_static(b"b")),
                Frame::Bulk(Bytes::from_static(b"c")),
            ])
        );

        assert_eq!(
            lpop(&mut ks, &args(&["l"])).unwrap(),
            Frame::Bulk(Bytes::from_static(b"z"))
        );
        assert_eq!(
            rpop(&mut ks, &args(&["l"])).unwrap(),
            Frame::Bulk(Bytes::from_static(b"c"))
        );
        assert_eq!(llen(&mut ks, &args(&["l"])).unwrap(), Frame::Integer(2));
        assert_eq!(lpop(&mut ks, &args(&["ghost"])).unwrap(), Frame::Null);
    }

    #[test]
    fn lindex_lset_ltrim() {
        let mut ks = Keyspace::new();
        rpush(&mut ks, &args(&["l", "a", "b", "c", "d"])).unwrap();

        assert_eq!(
            lindex(&mut ks, &args(&["l", "-1"])).unwrap(),
            Frame::Bulk(Bytes::from_static(b"d"))
        );
        assert_eq!(lindex(&mut ks, &args(&["l", "9"])).unwrap(), Frame::Null);

        assert_eq!(lset(&mut ks, &args(&["l", "0", "A"])).unwrap(), Frame::ok());
        assert_eq!(
            lset(&mut ks, &args(&["l", "9", "X"])).unwrap_err(),
            Frame::Error("ERR index out of range".into())
        );
        assert_eq!(
            lset(&mut ks, &args(&["ghost", "0", "X"])).unwrap_err(),
            Frame::Error("ERR no such key".into())
        );

        assert_eq!(ltrim(&mut ks, &args(&["l", "1", "2"])).unwrap(), Frame::ok());
        assert_eq!(
            lrange(&mut ks, &args(&["l", "0", "-1"])).unwrap(),
            Frame::Array(vec![
                Frame::Bulk(Bytes::from_static(b"b")),
                Frame::Bulk(Bytes::from_static(b"c")),
            ])
        );
    }

    #[test]
    fn wrong_type_reply() {
        let mut ks = Keyspace::new();
        ks.set("s".into(), Bytes::from_static(b"v"), None, false, false);
        let reply = lpush(&mut ks, &args(&["s", "x"])).unwrap_err();
        assert!(matches!(reply, Frame::Error(msg) if msg.starts_with("WRONGTYPE")));
    }
}
