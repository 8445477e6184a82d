//! The database manager: a fixed-size array of keyspaces.
//!
//! All databases live in one process; clients select one per
//! connection. The store executor is the only owner, so selection is
//! just an index.

use crate::keyspace::{Keyspace, KeyspaceConfig, KeyspaceStats};

/// Default number of logical databases.
pub const DEFAULT_DATABASE_COUNT: usize = 16;

/// A fixed array of numbered keyspaces (0..N-1).
pub struct Databases {
    dbs: Vec<Keyspace>,
}

impl Databases {
    /// Creates `count` empty keyspaces sharing the same config.
    ///
    /// Panics if `count` is zero.
    pub fn new(count: usize, config: KeyspaceConfig) -> Self {
        assert!(count > 0, "database count must be at least 1");
        Self {
            dbs: (0..count).map(|_| Keyspace::with_config(config.clone())).collect(),
        }
    }

    /// Returns the number of databases.
    pub fn count(&self) -> usize {
        self.dbs.len()
    }

    /// Returns the keyspace at `index`, or `None` if out of range.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Keyspace> {
        self.dbs.get_mut(index)
    }

    /// Returns the keyspace at `index` for read-only iteration.
    pub fn get(&self, index: usize) -> Option<&Keyspace> {
        self.dbs.get(index)
    }

    /// Clears every database.
    pub fn flush_all(&mut self) {
        for db in &mut self.dbs {
            db.clear();
        }
    }

    /// Iterates over `(index, keyspace)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Keyspace)> {
        self.dbs.iter().enumerate()
    }

    /// Iterates mutably over `(index, keyspace)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Keyspace)> {
        self.dbs.iter_mut().enumerate()
    }

    /// Sums stats across all databases.
    pub fn total_stats(&self) -> KeyspaceStats {
        let mut total = KeyspaceStats::default();
        for db in &self.dbs {
            let s = db.stats();
            total.key_count += s.key_count;
            total.used_bytes += s.used_bytes;
            total.keys_with_expiry += s.keys_with_expiry;
            total.hits += s.hits;
            total.misses += s.misses;
            total.keys_expired += s.keys_expired;
            total.keys_evicted += s.keys_evicted;
        }
        total
    }
}
