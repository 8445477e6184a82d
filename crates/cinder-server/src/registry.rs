//! The command registry: name → (arity, flags, handler).
//!
//! Built once at startup and shared through the server context. The
//! session loop consults it for every incoming command — including at
//! MULTI queue time, so unknown commands and arity errors poison a
//! transaction before EXEC ever runs.

use std::collections::HashMap;

use bytes::Bytes;
use cinder_core::Keyspace;

use crate::commands::{generic, hashes, lists, sets, strings, zsets, CmdResult};

/// A handler that runs inside the store executor against the
/// connection's selected keyspace.
pub type KeyspaceHandler = fn(&mut Keyspace, &[Bytes]) -> CmdResult;

/// Operations the store executor handles itself because they need
/// state beyond one keyspace (persistence machinery, all databases,
/// the pub/sub broker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Save,
    BgSave,
    BgRewriteAof,
    FlushAll,
    Publish,
    Info,
}

/// Where a command executes.
pub enum Handler {
    /// In the store executor, against the selected keyspace.
    Keyspace(KeyspaceHandler),
    /// In the store executor, with access to its full state.
    Store(StoreOp),
    /// In the session task; never reaches the executor.
    Connection,
}

/// Static description of one command.
pub struct CommandSpec {
    /// Canonical upper-cased name.
    pub name: &'static str,
    /// Minimum argument count, excluding the verb.
    pub min_args: usize,
    /// Maximum argument count; `None` is unbounded.
    pub max_args: Option<usize>,
    pub handler: Handler,
    /// Mutates the keyspace — a successful, dirtying run is appended
    /// to the AOF.
    pub is_write: bool,
    /// Accepted while the connection is in subscriber mode.
    pub pubsub_ok: bool,
    /// MULTI/EXEC/DISCARD/WATCH/UNWATCH — never queued.
    pub txn_control: bool,
    /// Rejected at queue time: needs session-local state the executor
    /// doesn't have.
    pub no_txn: bool,
}

impl CommandSpec {
    /// Checks an argument count against the declared arity.
    pub fn arity_ok(&self, argc: usize) -> bool {
        argc >= self.min_args && self.max_args.map_or(true, |max| argc <= max)
    }
}

/// Shorthand constructors keep the table below readable.
const fn read(
    name: &'static str,
    min: usize,
    max: Option<usize>,
    f: KeyspaceHandler,
) -> CommandSpec {
    CommandSpec {
        name,
        min_args: min,
        max_args: max,
        handler: Handler::Keyspace(f),
        is_write: false,
        pubsub_ok: false,
        txn_control: false,
        no_txn: false,
    }
}

const fn write(
    name: &'static str,
    min: usize,
    max: Option<usize>,
    f: KeyspaceHandler,
) -> CommandSpec {
    CommandSpec {
        name,
        min_args: min,
        max_args: max,
        handler: Handler::Keyspace(f),
        is_write: true,
        pubsub_ok: false,
        txn_control: false,
        no_txn: false,
    }
}

const fn store(name: &'static str, min: usize, max: Option<usize>, op: StoreOp, is_write: bool) -> CommandSpec {
    CommandSpec {
        name,
        min_args: min,
        max_args: max,
        handler: Handler::Store(op),
        is_write,
        pubsub_ok: false,
        txn_control: false,
        no_txn: false,
    }
}

const fn connection(
    name: &'static str,
    min: usize,
    max: Option<usize>,
    txn_control: bool,
    pubsub_ok: bool,
    no_txn: bool,
) -> CommandSpec {
    CommandSpec {
        name,
        min_args: min,
        max_args: max,
        handler: Handler::Connection,
        is_write: false,
        pubsub_ok,
        txn_control,
        no_txn,
    }
}

/// Every command the server speaks.
static COMMANDS: &[CommandSpec] = &[
    // connection basics — keyspace-shaped so they can run inside EXEC
    CommandSpec {
        name: "PING",
        min_args: 0,
        max_args: Some(1),
        handler: Handler::Keyspace(generic::ping),
        is_write: false,
        pubsub_ok: true,
        txn_control: false,
        no_txn: false,
    },
    read("ECHO", 1, Some(1), generic::echo),
    // keyed operations
    read("GET", 1, Some(1), strings::get),
    write("SET", 2, Some(7), strings::set),
    write("DEL", 1, None, generic::del),
    read("EXISTS", 1, None, generic::exists),
    read("TYPE", 1, Some(1), generic::type_of),
    write("EXPIRE", 2, Some(2), generic::expire),
    write("PEXPIRE", 2, Some(2), generic::pexpire),
    write("PEXPIREAT", 2, Some(2), generic::pexpireat),
    read("TTL", 1, Some(1), generic::ttl),
    read("PTTL", 1, Some(1), generic::pttl),
    write("PERSIST", 1, Some(1), generic::persist),
    write("RENAME", 2, Some(2), generic::rename),
    read("KEYS", 1, Some(1), generic::keys),
    read("RANDOMKEY", 0, Some(0), generic::randomkey),
    read("DBSIZE", 0, Some(0), generic::dbsize),
    write("FLUSHDB", 0, Some(0), generic::flushdb),
    // strings
    write("INCR", 1, Some(1), strings::incr),
    write("DECR", 1, Some(1), strings::decr),
    write("INCRBY", 2, Some(2), strings::incrby),
    write("DECRBY", 2, Some(2), strings::decrby),
    write("INCRBYFLOAT", 2, Some(2), strings::incrbyfloat),
    write("APPEND", 2, Some(2), strings::append),
    read("STRLEN", 1, Some(1), strings::strlen),
    // lists
    write("LPUSH", 2, None, lists::lpush),
    write("RPUSH", 2, None, lists::rpush),
    write("LPOP", 1, Some(1), lists::lpop),
    write("RPOP", 1, Some(1), lists::rpop),
    read("LRANGE", 3, Some(3), lists::lrange),
    read("LLEN", 1, Some(1), lists::llen),
    read("LINDEX", 2, Some(2), lists::lindex),
    write("LSET", 3, Some(3), lists::lset),
    write("LTRIM", 3, Some(3), lists::ltrim),
    // hashes
    write("HSET", 3, None, hashes::hset),
    write("HSETNX", 3, Some(3), hashes::hsetnx),
    read("HGET", 2, Some(2), hashes::hget),
    write("HDEL", 2, None, hashes::hdel),
    read("HEXISTS", 2, Some(2), hashes::hexists),
    read("HLEN", 1, Some(1), hashes::hlen),
    read("HGETALL", 1, Some(1), hashes::hgetall),
    read("HKEYS", 1, Some(1), hashes::hkeys),
    read("HVALS", 1, Some(1), hashes::hvals),
    write("HINCRBY", 3, Some(3), hashes::hincrby),
    // sets
    write("SADD", 2, None, sets::sadd),
    write("SREM", 2, None, sets::srem),
    read("SMEMBERS", 1, Some(1), sets::smembers),
    read("SISMEMBER", 2, Some(2), sets::sismember),
    read("SCARD", 1, Some(1), sets::scard),
    read("SRANDMEMBER", 1, Some(2), sets::srandmember),
    write("SPOP", 1, Some(2), sets::spop),
    read("SINTER", 1, None, sets::sinter),
    read("SUNION", 1, None, sets::sunion),
    read("SDIFF", 1, None, sets::sdiff),
    write("SMOVE", 3, Some(3), sets::smove),
    // sorted sets
    write("ZADD", 3, None, zsets::zadd),
    write("ZREM", 2, None, zsets::zrem),
    read("ZSCORE", 2, Some(2), zsets::zscore),
    read("ZCARD", 1, Some(1), zsets::zcard),
    read("ZRANK", 2, Some(2), zsets::zrank),
    read("ZREVRANK", 2, Some(2), zsets::zrevrank),
    read("ZRANGE", 3, Some(4), zsets::zrange),
    read("ZREVRANGE", 3, Some(4), zsets::zrevrange),
    read("ZRANGEBYSCORE", 3, Some(4), zsets::zrangebyscore),
    read("ZCOUNT", 3, Some(3), zsets::zcount),
    write("ZINCRBY", 3, Some(3), zsets::zincrby),
    // store-level operations
    store("SAVE", 0, Some(0), StoreOp::Save, false),
    store("BGSAVE", 0, Some(0), StoreOp::BgSave, false),
    store("BGREWRITEAOF", 0, Some(0), StoreOp::BgRewriteAof, false),
    store("FLUSHALL", 0, Some(0), StoreOp::FlushAll, true),
    store("PUBLISH", 2, Some(2), StoreOp::Publish, false),
    store("INFO", 0, Some(1), StoreOp::Info, false),
    // session-level commands
    connection("SELECT", 1, Some(1), false, false, true),
    connection("QUIT", 0, Some(0), false, true, true),
    connection("MULTI", 0, Some(0), true, false, false),
    connection("EXEC", 0, Some(0), true, false, false),
    connection("DISCARD", 0, Some(0), true, false, false),
    connection("WATCH", 1, None, true, false, false),
    connection("UNWATCH", 0, Some(0), true, false, false),
    connection("SUBSCRIBE", 1, None, false, true, true),
    connection("UNSUBSCRIBE", 0, None, false, true, true),
    connection("PSUBSCRIBE", 1, None, false, true, true),
    connection("PUNSUBSCRIBE", 0, None, false, true, true),
];

/// Case-insensitive name → command map, populated at startup.
pub struct Registry {
    map: HashMap<&'static str, &'static CommandSpec>,
}

impl Registry {
    pub fn new() -> Self {
        let mut map = HashMap::with_capacity(COMMANDS.len());
        for spec in COMMANDS {
            map.insert(spec.name, spec);
        }
        Self { map }
    }

    /// Looks up a command by name, case-insensitively.
    pub fn lookup(&self, name: &str) -> Option<&'static CommandSpec> {
        self.map.get(name.to_ascii_uppercase().as_str()).copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
