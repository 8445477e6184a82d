//! The keyspace: one logical database.
//!
//! A `Keyspace` owns a flat `AHashMap<Box<str>, Entry>`, the index of
//! keys carrying an expiration, and a monotone version sequence used by
//! the transaction engine. Expired keys are removed lazily on access;
//! a sampling sweeper (see [`crate::expiry`]) cleans up keys nobody
//! reads. Memory usage is tracked on every mutation for eviction and
//! stats reporting.
//!
//! All operations are single-threaded — the store executor is the only
//! writer, so there is no internal locking.

use ahash::{AHashMap, AHashSet};
use bytes::Bytes;
use rand::seq::IteratorRandom;

use crate::glob::glob_match;
use crate::memory::{self, MemoryTracker};
use crate::time;
use crate::types::{self, Value};

mod string;
mod list;
mod hash;
mod set;
mod zset;

pub use list::LSetError;

const WRONGTYPE_MSG: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const OOM_MSG: &str = "OOM command not allowed when used memory > 'maxmemory'";

/// Error returned when a command is used against a key holding the
/// wrong type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrongType;

impl std::fmt::Display for WrongType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{WRONGTYPE_MSG}")
    }
}

impl std::error::Error for WrongType {}

/// Error returned by write operations that may fail due to type
/// mismatch or memory limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// The key holds a different type than expected.
    WrongType,
    /// Memory limit reached and eviction couldn't free enough space.
    OutOfMemory,
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::WrongType => write!(f, "{WRONGTYPE_MSG}"),
            WriteError::OutOfMemory => write!(f, "{OOM_MSG}"),
        }
    }
}

impl std::error::Error for WriteError {}

impl From<WrongType> for WriteError {
    fn from(_: WrongType) -> Self {
        WriteError::WrongType
    }
}

/// Errors that can occur during INCR/DECR/INCRBY/HINCRBY operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrError {
    /// Key holds a non-string (or non-hash) type.
    WrongType,
    /// Value is not a canonical signed 64-bit integer.
    NotAnInteger,
    /// Increment or decrement would overflow i64.
    Overflow,
    /// Memory limit reached.
    OutOfMemory,
}

impl std::fmt::Display for IncrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncrError::WrongType => write!(f, "{WRONGTYPE_MSG}"),
            IncrError::NotAnInteger => write!(f, "ERR value is not an integer or out of range"),
            IncrError::Overflow => write!(f, "ERR increment or decrement would overflow"),
            IncrError::OutOfMemory => write!(f, "{OOM_MSG}"),
        }
    }
}

impl std::error::Error for IncrError {}

/// Errors that can occur during INCRBYFLOAT / ZINCRBY operations.
#[derive(Debug, Clone, PartialEq)]
pub enum IncrFloatError {
    /// Key holds the wrong type.
    WrongType,
    /// Value is not a valid float.
    NotAFloat,
    /// Result would be NaN or Infinity.
    NanOrInfinity,
    /// Memory limit reached.
    OutOfMemory,
}

impl std::fmt::Display for IncrFloatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncrFloatError::WrongType => write!(f, "{WRONGTYPE_MSG}"),
            IncrFloatError::NotAFloat => write!(f, "ERR value is not a valid float"),
            IncrFloatError::NanOrInfinity => {
                write!(f, "ERR increment would produce NaN or Infinity")
            }
            IncrFloatError::OutOfMemory => write!(f, "{OOM_MSG}"),
        }
    }
}

impl std::error::Error for IncrFloatError {}

/// Error returned when RENAME fails because the source key doesn't exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameError {
    /// The source key does not exist.
    NoSuchKey,
}

impl std::fmt::Display for RenameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenameError::NoSuchKey => write!(f, "ERR no such key"),
        }
    }
}

impl std::error::Error for RenameError {}

/// How the keyspace handles writes when the memory limit is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Return an error on writes when memory is full.
    #[default]
    NoEviction,
    /// Evict the key with the oldest last-access time (sampled).
    AllKeysLru,
    /// Evict the key with the lowest access count (sampled),
    /// breaking ties by oldest last access.
    AllKeysLfu,
    /// Evict a uniformly random key.
    AllKeysRandom,
    /// Evict the key with the smallest remaining TTL, chosen from the
    /// expiring-keys index.
    VolatileTtl,
}

/// Configuration for a single keyspace.
#[derive(Debug, Clone, Default)]
pub struct KeyspaceConfig {
    /// Maximum memory in bytes. `None` means unlimited.
    pub max_memory: Option<usize>,
    /// What to do when memory is full.
    pub eviction_policy: EvictionPolicy,
}

/// Result of a SET that may carry NX/XX conditions.
#[derive(Debug, PartialEq, Eq)]
pub enum SetOutcome {
    /// The key was stored.
    Done,
    /// NX/XX condition was not met (key existed for NX, or didn't for XX).
    Blocked,
    /// Memory limit reached and eviction policy is noeviction.
    OutOfMemory,
}

/// A single entry in the keyspace: the typed value plus the metadata
/// the expiration, eviction, and transaction machinery needs.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Value,
    /// Absolute wall-clock expiry in unix ms. 0 = no expiry.
    pub(crate) expires_at_ms: u64,
    /// Creation timestamp in unix ms.
    pub(crate) created_at_ms: u64,
    /// Last access timestamp in unix ms (LRU).
    pub(crate) last_access_ms: u64,
    /// Access counter (LFU).
    pub(crate) accesses: u64,
    /// Version stamp from the keyspace-wide sequence. Stamps never
    /// repeat, so WATCH can distinguish delete + re-create from
    /// no change.
    pub(crate) version: u64,
}

impl Entry {
    fn new(value: Value, expires_at_ms: u64, version: u64) -> Self {
        let now = time::now_ms();
        Self {
            value,
            expires_at_ms,
            created_at_ms: now,
            last_access_ms: now,
            accesses: 0,
            version,
        }
    }

    /// Returns `true` if this entry has passed its expiration time.
    fn is_expired(&self) -> bool {
        time::is_expired(self.expires_at_ms)
    }

    /// Marks this entry as accessed right now.
    fn touch(&mut self) {
        self.last_access_ms = time::now_ms();
        self.accesses = self.accesses.saturating_add(1);
    }
}

/// Result of a TTL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtlResult {
    /// Key exists and has a TTL; remaining milliseconds.
    Remaining(u64),
    /// Key exists but has no expiration set.
    NoExpiry,
    /// Key does not exist.
    NotFound,
}

/// Aggregated statistics for a keyspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyspaceStats {
    /// Number of live keys.
    pub key_count: usize,
    /// Estimated memory usage in bytes.
    pub used_bytes: usize,
    /// Number of keys with an expiration set.
    pub keys_with_expiry: usize,
    /// Cumulative read hits.
    pub hits: u64,
    /// Cumulative read misses.
    pub misses: u64,
    /// Cumulative count of keys removed by expiration (lazy + sweeper).
    pub keys_expired: u64,
    /// Cumulative count of keys removed by eviction.
    pub keys_evicted: u64,
}

/// Number of random keys to sample when looking for an eviction victim.
///
/// Eviction is sampling-based: randomly select this many keys and evict
/// the best candidate among them by the configured policy. This trades
/// exactness for O(1) eviction with no auxiliary ordering structure.
const EVICTION_SAMPLE_SIZE: usize = 16;

/// One logical database: key → value map, expiration index, versions.
pub struct Keyspace {
    entries: AHashMap<Box<str>, Entry>,
    /// Keys that currently carry an expiration. The sampling sweeper
    /// and the volatile-ttl eviction policy draw candidates from here.
    expiring: AHashSet<Box<str>>,
    memory: MemoryTracker,
    config: KeyspaceConfig,
    /// Monotone sequence; every mutation stamps the touched entry with
    /// the next value.
    version_seq: u64,
    hits: u64,
    misses: u64,
    expired_total: u64,
    evicted_total: u64,
}

impl Keyspace {
    /// Creates a new, empty keyspace with default config (no memory limit).
    pub fn new() -> Self {
        Self::with_config(KeyspaceConfig::default())
    }

    /// Creates a new, empty keyspace with the given config.
    pub fn with_config(config: KeyspaceConfig) -> Self {
        Self {
            entries: AHashMap::new(),
            expiring: AHashSet::new(),
            memory: MemoryTracker::new(),
            config,
            version_seq: 0,
            hits: 0,
            misses: 0,
            expired_total: 0,
            evicted_total: 0,
        }
    }

    // -- versions ----------------------------------------------------------

    /// Returns the version stamp of a live key, or `None` if the key is
    /// absent or expired. The transaction engine records these at WATCH
    /// time and compares at EXEC.
    pub fn version(&mut self, key: &str) -> Option<u64> {
        if self.remove_if_expired(key) {
            return None;
        }
        self.entries.get(key).map(|e| e.version)
    }

    /// Returns the current value of the mutation sequence. Advances on
    /// every write; the executor compares before/after to decide
    /// whether a command dirtied this keyspace.
    pub fn mutation_seq(&self) -> u64 {
        self.version_seq
    }

    /// Draws the next version stamp.
    fn next_version(&mut self) -> u64 {
        self.version_seq += 1;
        self.version_seq
    }

    /// Re-stamps an existing entry after an in-place mutation.
    fn stamp(&mut self, key: &str) {
        let v = self.next_version();
        if let Some(e) = self.entries.get_mut(key) {
            e.version = v;
        }
    }

    // -- generic key operations -------------------------------------------

    /// Removes a key. Returns `true` if the key existed (and wasn't
    /// expired).
    pub fn del(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        if let Some(entry) = self.entries.remove(key) {
            self.memory.remove(key, &entry.value);
            self.expiring.remove(key);
            self.next_version();
            true
        } else {
            false
        }
    }

    /// Returns `true` if the key exists and hasn't expired.
    pub fn exists(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        self.entries.contains_key(key)
    }

    /// Sets an absolute expiration on an existing key. A deadline at or
    /// before the current time deletes the key immediately. Returns
    /// `true` if the key existed.
    pub fn expire_at_ms(&mut self, key: &str, at_ms: u64) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        if !self.entries.contains_key(key) {
            return false;
        }
        if at_ms <= time::now_ms() {
            // setting a deadline in the past is a delete
            self.del(key);
            return true;
        }
        let v = self.next_version();
        let entry = self.entries.get_mut(key).expect("presence checked above");
        entry.expires_at_ms = at_ms;
        entry.version = v;
        self.expiring.insert(Box::from(key));
        true
    }

    /// Removes the expiration from a key.
    ///
    /// Returns `true` if the key existed and had a timeout that was
    /// removed.
    pub fn persist(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(entry) if entry.expires_at_ms != time::NO_EXPIRY => {
                entry.expires_at_ms = time::NO_EXPIRY;
                self.expiring.remove(key);
                self.stamp(key);
                true
            }
            _ => false,
        }
    }

    /// Returns the TTL status for a key.
    pub fn ttl_ms(&mut self, key: &str) -> TtlResult {
        if self.remove_if_expired(key) {
            return TtlResult::NotFound;
        }
        match self.entries.get(key) {
            Some(entry) => match time::remaining_ms(entry.expires_at_ms) {
                Some(ms) => TtlResult::Remaining(ms),
                None => TtlResult::NoExpiry,
            },
            None => TtlResult::NotFound,
        }
    }

    /// Returns all live keys matching a glob pattern.
    ///
    /// O(n) scan of the entire keyspace.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let len = self.entries.len();
        if len > 100_000 {
            tracing::warn!(key_count = len, "KEYS scan over a large keyspace");
        }
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| String::from(&**key))
            .collect()
    }

    /// Returns a uniformly random live key, or `None` if the keyspace
    /// is empty.
    pub fn random_key(&self) -> Option<String> {
        let mut rng = rand::rng();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .choose(&mut rng)
            .map(|(key, _)| String::from(&**key))
    }

    /// Renames a key, preserving its value and expiration. If the
    /// destination exists it is overwritten. Both keys' versions bump.
    pub fn rename(&mut self, key: &str, newkey: &str) -> Result<(), RenameError> {
        self.remove_if_expired(key);
        self.remove_if_expired(newkey);

        let mut entry = match self.entries.remove(key) {
            Some(entry) => entry,
            None => return Err(RenameError::NoSuchKey),
        };

        self.memory.remove(key, &entry.value);
        self.expiring.remove(key);
        self.next_version();

        // remove destination if it exists
        if let Some(old_dest) = self.entries.remove(newkey) {
            self.memory.remove(newkey, &old_dest.value);
            self.expiring.remove(newkey);
        }

        // re-insert under the new name, preserving value and expiry
        self.memory.add(newkey, &entry.value);
        if entry.expires_at_ms != time::NO_EXPIRY {
            self.expiring.insert(Box::from(newkey));
        }
        entry.version = self.next_version();
        self.entries.insert(Box::from(newkey), entry);
        Ok(())
    }

    /// Removes all keys from the keyspace.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.next_version();
        }
        self.entries.clear();
        self.expiring.clear();
        self.memory.reset();
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the keyspace has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns aggregated stats for this keyspace. O(1).
    pub fn stats(&self) -> KeyspaceStats {
        KeyspaceStats {
            key_count: self.entries.len(),
            used_bytes: self.memory.used_bytes(),
            keys_with_expiry: self.expiring.len(),
            hits: self.hits,
            misses: self.misses,
            keys_expired: self.expired_total,
            keys_evicted: self.evicted_total,
        }
    }

    // -- persistence support ----------------------------------------------

    /// Iterates over all live entries, yielding the key, the value, and
    /// the absolute expiry in unix ms (`None` for persistent keys).
    /// Used by snapshot and AOF rewrite.
    pub fn iter_entries(&self) -> impl Iterator<Item = (&str, &Value, Option<u64>)> {
        self.entries.iter().filter_map(|(key, entry)| {
            if entry.is_expired() {
                return None;
            }
            let expire = if entry.expires_at_ms == time::NO_EXPIRY {
                None
            } else {
                Some(entry.expires_at_ms)
            };
            Some((&**key, &entry.value, expire))
        })
    }

    /// Clones every live entry into an owned vector — a point-in-time
    /// image of this keyspace for background snapshot/rewrite. `Bytes`
    /// payloads share their buffers, so the copy is proportional to key
    /// count, not data volume.
    pub fn freeze(&self) -> Vec<(String, Value, Option<u64>)> {
        self.iter_entries()
            .map(|(k, v, exp)| (k.to_owned(), v.clone(), exp))
            .collect()
    }

    /// Restores an entry during recovery, bypassing memory limits.
    ///
    /// Entries whose deadline already passed are skipped. Normal writes
    /// go through the typed operations — this is only for startup.
    pub fn restore(&mut self, key: String, value: Value, expires_at_ms: Option<u64>) {
        let expires_at_ms = expires_at_ms.unwrap_or(time::NO_EXPIRY);
        if time::is_expired(expires_at_ms) {
            return;
        }

        // replacing an existing entry keeps the books balanced
        if let Some(old) = self.entries.remove(key.as_str()) {
            self.memory.remove(&key, &old.value);
            self.expiring.remove(key.as_str());
        }

        self.memory.add(&key, &value);
        if expires_at_ms != time::NO_EXPIRY {
            self.expiring.insert(Box::from(key.as_str()));
        }
        let version = self.next_version();
        self.entries
            .insert(key.into_boxed_str(), Entry::new(value, expires_at_ms, version));
    }

    // -- expiration --------------------------------------------------------

    /// Randomly samples up to `count` keys from the expiring-keys index
    /// and removes any that have expired.
    ///
    /// Returns `(sampled, removed)`. Used by the sweeper cycle.
    pub fn expire_sample(&mut self, count: usize) -> (usize, usize) {
        if self.expiring.is_empty() {
            return (0, 0);
        }

        let mut rng = rand::rng();
        let candidates: Vec<String> = self
            .expiring
            .iter()
            .choose_multiple(&mut rng, count)
            .into_iter()
            .map(|k| String::from(&**k))
            .collect();

        let sampled = candidates.len();
        let mut removed = 0;
        for key in &candidates {
            if self.remove_if_expired(key) {
                removed += 1;
            }
        }
        (sampled, removed)
    }

    /// Checks if a key is expired and removes it if so. Returns `true`
    /// if the key was removed.
    fn remove_if_expired(&mut self, key: &str) -> bool {
        let expired = self
            .entries
            .get(key)
            .map(|e| e.is_expired())
            .unwrap_or(false);

        if expired {
            if let Some(entry) = self.entries.remove(key) {
                self.memory.remove(key, &entry.value);
                self.expiring.remove(key);
                self.expired_total += 1;
                self.next_version();
            }
        }
        expired
    }

    // -- eviction ----------------------------------------------------------

    /// Checks whether the memory limit allows a write that would grow
    /// usage by `estimated_increase` bytes, evicting per the configured
    /// policy if needed. Returns `true` if the write can proceed.
    fn ensure_capacity(&mut self, estimated_increase: usize) -> bool {
        let Some(max) = self.config.max_memory else {
            return true;
        };
        while self.memory.used_bytes() + estimated_increase > max {
            if !self.try_evict() {
                return false;
            }
        }
        true
    }

    /// Tries to evict one key according to the configured policy.
    /// Returns `true` if a key was evicted.
    fn try_evict(&mut self) -> bool {
        let victim = match self.config.eviction_policy {
            EvictionPolicy::NoEviction => None,
            EvictionPolicy::AllKeysRandom => {
                let mut rng = rand::rng();
                self.entries
                    .keys()
                    .choose(&mut rng)
                    .map(|k| String::from(&**k))
            }
            EvictionPolicy::AllKeysLru => self.sample_victim(|e| e.last_access_ms),
            EvictionPolicy::AllKeysLfu => {
                // lowest access count, ties broken by oldest access
                self.sample_victim(|e| (e.accesses, e.last_access_ms))
            }
            EvictionPolicy::VolatileTtl => {
                let mut rng = rand::rng();
                let candidates: Vec<&str> = self
                    .expiring
                    .iter()
                    .choose_multiple(&mut rng, EVICTION_SAMPLE_SIZE)
                    .into_iter()
                    .map(|k| &**k)
                    .collect();
                candidates
                    .into_iter()
                    .filter_map(|k| self.entries.get(k).map(|e| (k, e.expires_at_ms)))
                    .min_by_key(|&(_, at)| at)
                    .map(|(k, _)| k.to_owned())
            }
        };

        match victim {
            Some(key) => {
                if let Some(entry) = self.entries.remove(key.as_str()) {
                    self.memory.remove(&key, &entry.value);
                    self.expiring.remove(key.as_str());
                    self.evicted_total += 1;
                    self.next_version();
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Samples `EVICTION_SAMPLE_SIZE` entries and returns the key that
    /// minimizes `rank`.
    fn sample_victim<R: Ord>(&self, rank: impl Fn(&Entry) -> R) -> Option<String> {
        let mut rng = rand::rng();
        self.entries
            .iter()
            .choose_multiple(&mut rng, EVICTION_SAMPLE_SIZE)
            .into_iter()
            .min_by_key(|(_, e)| rank(e))
            .map(|(k, _)| String::from(&**k))
    }

    // -- shared helpers for the typed submodules --------------------------

    /// Checks whether a key either doesn't exist or holds the expected
    /// collection type. Returns `Ok(true)` if the key is new,
    /// `Ok(false)` if it exists with the right type, `Err` otherwise.
    fn ensure_collection_type(
        &self,
        key: &str,
        type_check: fn(&Value) -> bool,
    ) -> Result<bool, WriteError> {
        match self.entries.get(key) {
            None => Ok(true),
            Some(e) if type_check(&e.value) => Ok(false),
            Some(_) => Err(WriteError::WrongType),
        }
    }

    /// Inserts a new key with an empty collection value, stamped with a
    /// fresh version.
    fn insert_empty(&mut self, key: &str, value: Value) {
        self.memory.add(key, &value);
        let version = self.next_version();
        self.entries
            .insert(Box::from(key), Entry::new(value, time::NO_EXPIRY, version));
    }

    /// Runs a mutation against an existing entry, adjusting the memory
    /// tracker by the measured size difference and re-stamping the
    /// entry's version. Returns `None` if the key is absent.
    fn mutate_tracked<T>(&mut self, key: &str, f: impl FnOnce(&mut Entry) -> T) -> Option<T> {
        if !self.entries.contains_key(key) {
            return None;
        }
        let version = self.next_version();
        let entry = self.entries.get_mut(key)?;
        let old_size = memory::entry_size(key, &entry.value);
        let result = f(entry);
        entry.version = version;
        entry.touch();
        let new_size = memory::entry_size(key, &entry.value);
        self.memory.adjust(old_size, new_size);
        Some(result)
    }

    /// Deletes a key whose collection just became empty. Keys never
    /// point to empty collections.
    fn drop_if_empty_collection(&mut self, key: &str) {
        let empty = match self.entries.get(key).map(|e| &e.value) {
            Some(Value::List(d)) => d.is_empty(),
            Some(Value::Hash(m)) => m.is_empty(),
            Some(Value::Set(s)) => s.is_empty(),
            Some(Value::SortedSet(z)) => z.is_empty(),
            _ => false,
        };
        if empty {
            if let Some(entry) = self.entries.remove(key) {
                self.memory.remove(key, &entry.value);
                self.expiring.remove(key);
            }
        }
    }

    /// Counts a read that found a live value.
    fn record_hit(&mut self) {
        self.hits += 1;
    }

    /// Counts a read that found nothing.
    fn record_miss(&mut self) {
        self.misses += 1;
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a canonical signed 64-bit integer: optional minus sign,
/// digits only — no plus sign, no whitespace. Shared by the string
/// and hash increment paths so both reject the same malformed inputs.
pub(crate) fn parse_i64_strict(data: &[u8]) -> Result<i64, IncrError> {
    if data.first() == Some(&b'+') {
        return Err(IncrError::NotAnInteger);
    }
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(IncrError::NotAnInteger)
}

/// Formats a float the way replies expect: no trailing zeros, no `.0`
/// on whole numbers, `inf`/`-inf` for infinities.
pub(crate) fn format_float(val: f64) -> String {
    if val == f64::INFINITY {
        return "inf".into();
    }
    if val == f64::NEG_INFINITY {
        return "-inf".into();
    }
    if val == val.trunc() && val.abs() < 1e17 {
        format!("{}", val as i64)
    } else {
        format!("{val}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn set(ks: &mut Keyspace, key: &str, val: &str) {
        assert_eq!(
            ks.set(key.to_owned(), Bytes::copy_from_slice(val.as_bytes()), None, false, false),
            SetOutcome::Done
        );
    }

    fn set_ttl(ks: &mut Keyspace, key: &str, val: &str, ttl_ms: u64) {
        let at = time::now_ms() + ttl_ms;
        assert_eq!(
            ks.set(
                key.to_owned(),
                Bytes::copy_from_slice(val.as_bytes()),
                Some(at),
                false,
                false
            ),
            SetOutcome::Done
        );
    }

    #[test]
    fn del_existing() {
        let mut ks = Keyspace::new();
        set(&mut ks, "key", "val");
        assert!(ks.del("key"));
        assert_eq!(ks.get_string("key").unwrap(), None);
    }

    #[test]
    fn del_missing() {
        let mut ks = Keyspace::new();
        assert!(!ks.del("nope"));
    }

    #[test]
    fn exists_present_and_absent() {
        let mut ks = Keyspace::new();
        set(&mut ks, "yes", "here");
        assert!(ks.exists("yes"));
        assert!(!ks.exists("no"));
    }

    #[test]
    fn ttl_queries() {
        let mut ks = Keyspace::new();
        set(&mut ks, "plain", "v");
        set_ttl(&mut ks, "timed", "v", 60_000);

        assert_eq!(ks.ttl_ms("plain"), TtlResult::NoExpiry);
        assert_eq!(ks.ttl_ms("missing"), TtlResult::NotFound);
        match ks.ttl_ms("timed") {
            TtlResult::Remaining(ms) => assert!(ms > 58_000 && ms <= 60_000),
            other => panic!("expected Remaining, got {other:?}"),
        }
    }

    #[test]
    fn expired_key_reads_as_absent() {
        let mut ks = Keyspace::new();
        set_ttl(&mut ks, "temp", "gone", 5);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ks.get_string("temp").unwrap(), None);
        assert!(!ks.exists("temp"));
        assert_eq!(ks.ttl_ms("temp"), TtlResult::NotFound);
        assert_eq!(ks.stats().keys_expired, 1);
    }

    #[test]
    fn expire_at_past_deadline_deletes() {
        let mut ks = Keyspace::new();
        set(&mut ks, "key", "val");
        assert!(ks.expire_at_ms("key", time::now_ms().saturating_sub(1)));
        assert!(!ks.exists("key"));
    }

    #[test]
    fn expire_missing_key() {
        let mut ks = Keyspace::new();
        assert!(!ks.expire_at_ms("nope", time::now_ms() + 60_000));
    }

    #[test]
    fn persist_removes_expiry() {
        let mut ks = Keyspace::new();
        set_ttl(&mut ks, "key", "val", 60_000);
        assert!(matches!(ks.ttl_ms("key"), TtlResult::Remaining(_)));

        assert!(ks.persist("key"));
        assert_eq!(ks.ttl_ms("key"), TtlResult::NoExpiry);
        assert_eq!(ks.stats().keys_with_expiry, 0);

        // no expiry to remove the second time
        assert!(!ks.persist("key"));
        assert!(!ks.persist("missing"));
    }

    #[test]
    fn keys_with_pattern() {
        let mut ks = Keyspace::new();
        set(&mut ks, "user:1", "a");
        set(&mut ks, "user:2", "b");
        set(&mut ks, "item:1", "c");
        let mut result = ks.keys("user:*");
        result.sort();
        assert_eq!(result, vec!["user:1", "user:2"]);
        assert_eq!(ks.keys("*").len(), 3);
    }

    #[test]
    fn random_key_draws_from_live_keys() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.random_key(), None);
        set(&mut ks, "only", "v");
        assert_eq!(ks.random_key(), Some("only".into()));
    }

    #[test]
    fn rename_preserves_expiry() {
        let mut ks = Keyspace::new();
        set_ttl(&mut ks, "old", "val", 60_000);
        let before = match ks.ttl_ms("old") {
            TtlResult::Remaining(ms) => ms,
            other => panic!("expected Remaining, got {other:?}"),
        };
        ks.rename("old", "new").unwrap();
        assert!(!ks.exists("old"));
        match ks.ttl_ms("new") {
            TtlResult::Remaining(ms) => assert!(ms <= before && ms > before - 2_000),
            other => panic!("expected Remaining, got {other:?}"),
        }
    }

    #[test]
    fn rename_overwrites_destination() {
        let mut ks = Keyspace::new();
        set(&mut ks, "src", "new_val");
        set(&mut ks, "dst", "old_val");
        ks.rename("src", "dst").unwrap();
        assert!(!ks.exists("src"));
        assert_eq!(
            ks.get_string("dst").unwrap(),
            Some(Bytes::from_static(b"new_val"))
        );
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn rename_missing_key_is_error() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.rename("missing", "new").unwrap_err(), RenameError::NoSuchKey);
    }

    #[test]
    fn clear_removes_everything() {
        let mut ks = Keyspace::new();
        set(&mut ks, "a", "1");
        set_ttl(&mut ks, "b", "2", 60_000);
        ks.clear();
        assert!(ks.is_empty());
        assert_eq!(ks.stats().used_bytes, 0);
        assert_eq!(ks.stats().keys_with_expiry, 0);
    }

    // -- versions --

    #[test]
    fn versions_bump_on_every_write() {
        let mut ks = Keyspace::new();
        set(&mut ks, "k", "1");
        let v1 = ks.version("k").unwrap();

        set(&mut ks, "k", "2");
        let v2 = ks.version("k").unwrap();
        assert!(v2 > v1);

        ks.expire_at_ms("k", time::now_ms() + 60_000);
        let v3 = ks.version("k").unwrap();
        assert!(v3 > v2);

        ks.persist("k");
        let v4 = ks.version("k").unwrap();
        assert!(v4 > v3);
    }

    #[test]
    fn version_none_after_delete() {
        let mut ks = Keyspace::new();
        set(&mut ks, "k", "v");
        assert!(ks.version("k").is_some());
        ks.del("k");
        assert_eq!(ks.version("k"), None);
    }

    #[test]
    fn recreate_gets_fresh_version() {
        let mut ks = Keyspace::new();
        set(&mut ks, "k", "v");
        let v1 = ks.version("k").unwrap();
        ks.del("k");
        set(&mut ks, "k", "v");
        let v2 = ks.version("k").unwrap();
        assert_ne!(v1, v2);
    }

    #[test]
    fn reads_do_not_bump_versions() {
        let mut ks = Keyspace::new();
        set(&mut ks, "k", "v");
        let v1 = ks.version("k").unwrap();
        let _ = ks.get_string("k");
        let _ = ks.exists("k");
        let _ = ks.ttl_ms("k");
        assert_eq!(ks.version("k"), Some(v1));
    }

    #[test]
    fn expired_version_observed_as_absent() {
        let mut ks = Keyspace::new();
        set_ttl(&mut ks, "k", "v", 5);
        assert!(ks.version("k").is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ks.version("k"), None);
    }

    // -- stats and memory --

    #[test]
    fn memory_tracks_set_and_del() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.stats().used_bytes, 0);
        set(&mut ks, "key", "value");
        let after_set = ks.stats().used_bytes;
        assert!(after_set > 0);
        ks.del("key");
        assert_eq!(ks.stats().used_bytes, 0);
    }

    #[test]
    fn stats_track_expiry_count_and_hits() {
        let mut ks = Keyspace::new();
        set(&mut ks, "a", "1");
        set_ttl(&mut ks, "b", "2", 60_000);

        let _ = ks.get_string("a"); // hit
        let _ = ks.get_string("missing"); // miss

        let stats = ks.stats();
        assert_eq!(stats.key_count, 2);
        assert_eq!(stats.keys_with_expiry, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    // -- eviction --

    fn tiny(policy: EvictionPolicy) -> Keyspace {
        Keyspace::with_config(KeyspaceConfig {
            max_memory: Some(300),
            eviction_policy: policy,
        })
    }

    #[test]
    fn noeviction_rejects_when_full() {
        let mut ks = tiny(EvictionPolicy::NoEviction);
        set(&mut ks, "a", "val");
        set(&mut ks, "b", "val");
        let result = ks.set("c".into(), Bytes::from_static(b"val"), None, false, false);
        assert_eq!(result, SetOutcome::OutOfMemory);
        assert!(ks.exists("a"));
        assert!(ks.exists("b"));
    }

    #[test]
    fn lru_eviction_makes_room() {
        let mut ks = tiny(EvictionPolicy::AllKeysLru);
        set(&mut ks, "a", "val");
        set(&mut ks, "b", "val");
        set(&mut ks, "c", "val");
        assert!(ks.len() < 3);
        assert!(ks.stats().keys_evicted > 0);
    }

    #[test]
    fn random_eviction_makes_room() {
        let mut ks = tiny(EvictionPolicy::AllKeysRandom);
        for i in 0..10 {
            set(&mut ks, &format!("k{i}"), "val");
        }
        assert!(ks.len() < 10);
    }

    #[test]
    fn volatile_ttl_evicts_shortest_lived() {
        let mut ks = Keyspace::with_config(KeyspaceConfig {
            max_memory: Some(500),
            eviction_policy: EvictionPolicy::VolatileTtl,
        });
        set_ttl(&mut ks, "short", "val", 1_000);
        set_ttl(&mut ks, "long", "val", 600_000);
        // force pressure until an eviction happens
        set_ttl(&mut ks, "more1", "val", 300_000);
        set_ttl(&mut ks, "more2", "val", 300_000);
        assert!(ks.stats().keys_evicted > 0 || ks.len() == 4);
    }

    // -- sweeper sampling --

    #[test]
    fn expire_sample_removes_expired_keys() {
        let mut ks = Keyspace::new();
        for i in 0..10 {
            set_ttl(&mut ks, &format!("temp:{i}"), "gone", 5);
        }
        for i in 0..5 {
            set(&mut ks, &format!("keep:{i}"), "stay");
        }
        std::thread::sleep(Duration::from_millis(20));

        let (sampled, removed) = ks.expire_sample(20);
        assert_eq!(sampled, 10, "sampler draws only from the expiring index");
        assert_eq!(removed, 10);
        assert_eq!(ks.len(), 5);
    }

    #[test]
    fn expire_sample_on_clean_keyspace() {
        let mut ks = Keyspace::new();
        set(&mut ks, "a", "1");
        assert_eq!(ks.expire_sample(20), (0, 0));
    }

    // -- restore / freeze --

    #[test]
    fn restore_skips_already_expired() {
        let mut ks = Keyspace::new();
        ks.restore(
            "dead".into(),
            Value::String(Bytes::from_static(b"x")),
            Some(time::now_ms().saturating_sub(1_000)),
        );
        assert!(!ks.exists("dead"));
    }

    #[test]
    fn restore_roundtrips_through_freeze() {
        let mut ks = Keyspace::new();
        set(&mut ks, "a", "1");
        set_ttl(&mut ks, "b", "2", 60_000);

        let image = ks.freeze();
        let mut restored = Keyspace::new();
        for (key, value, expire) in image {
            restored.restore(key, value, expire);
        }
        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored.get_string("a").unwrap(),
            Some(Bytes::from_static(b"1"))
        );
        assert!(matches!(restored.ttl_ms("b"), TtlResult::Remaining(_)));
    }

    #[test]
    fn format_float_strips_trailing_zeros() {
        assert_eq!(format_float(10.0), "10");
        assert_eq!(format_float(10.5), "10.5");
        assert_eq!(format_float(-3.0), "-3");
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }
}
