//! Memory tracking for the keyspace.
//!
//! Provides byte-level accounting of memory used by entries. Updated on
//! every mutation so the keyspace can enforce memory limits and report
//! stats without scanning itself.
//!
//! Overhead constants are empirical estimates for 64-bit platforms.
//! Overestimating is fine (triggers eviction earlier); the numbers are
//! used for eviction triggers and reporting, not correctness.

use crate::types::Value;

/// Estimated fixed overhead per entry in the keyspace map: the boxed
/// key header, the Entry struct fields (value tag, timestamps, version,
/// access counter), and hashbrown per-slot bookkeeping.
pub(crate) const ENTRY_OVERHEAD: usize = 96;

/// Per-element overhead for `VecDeque<Bytes>` (the Bytes handle plus
/// amortized ring-buffer slack).
const LIST_ELEMENT_OVERHEAD: usize = 40;

/// Per-entry overhead for `HashMap` based containers (hash, set).
const MAP_ENTRY_OVERHEAD: usize = 56;

/// Per-member overhead for the sorted set's dual index: one BTreeMap
/// entry plus one HashMap entry, with the member string stored twice.
const ZSET_MEMBER_OVERHEAD: usize = 120;

/// Tracks memory usage for a single keyspace.
///
/// All updates are explicit — callers add and remove entry sizes on
/// every mutation. This avoids any hidden scanning cost.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    used_bytes: usize,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets tracking to zero. Used by FLUSHDB.
    pub fn reset(&mut self) {
        self.used_bytes = 0;
    }

    /// Returns the current estimated memory usage in bytes.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Records the addition of a new entry.
    pub fn add(&mut self, key: &str, value: &Value) {
        self.used_bytes += entry_size(key, value);
    }

    /// Records the removal of an entry.
    pub fn remove(&mut self, key: &str, value: &Value) {
        self.used_bytes = self.used_bytes.saturating_sub(entry_size(key, value));
    }

    /// Adjusts used bytes for an in-place mutation, given the full
    /// entry sizes before and after.
    pub fn adjust(&mut self, old_entry_size: usize, new_entry_size: usize) {
        self.used_bytes = self
            .used_bytes
            .saturating_sub(old_entry_size)
            .saturating_add(new_entry_size);
    }
}

/// Estimates the total memory footprint of a single entry:
/// key bytes + value payload + fixed per-entry overhead.
pub fn entry_size(key: &str, value: &Value) -> usize {
    ENTRY_OVERHEAD + key.len() + value_size(value)
}

/// Estimates the heap footprint of a value's payload.
pub fn value_size(value: &Value) -> usize {
    match value {
        Value::String(data) => data.len(),
        Value::List(deque) => deque
            .iter()
            .map(|v| v.len() + LIST_ELEMENT_OVERHEAD)
            .sum(),
        Value::Hash(map) => map
            .iter()
            .map(|(f, v)| f.len() + v.len() + MAP_ENTRY_OVERHEAD)
            .sum(),
        Value::Set(set) => set
            .iter()
            .map(|m| m.len() + MAP_ENTRY_OVERHEAD)
            .sum(),
        Value::SortedSet(ss) => ss
            .iter()
            .map(|(m, _)| m.len() * 2 + ZSET_MEMBER_OVERHEAD)
            .sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn string_size_scales_with_payload() {
        let small = entry_size("k", &Value::String(Bytes::from_static(b"v")));
        let large = entry_size("k", &Value::String(Bytes::from(vec![0u8; 1000])));
        assert!(large > small + 900);
    }

    #[test]
    fn tracker_add_remove_balances() {
        let mut tracker = MemoryTracker::new();
        let value = Value::String(Bytes::from_static(b"hello"));
        tracker.add("key", &value);
        assert!(tracker.used_bytes() > 0);
        tracker.remove("key", &value);
        assert_eq!(tracker.used_bytes(), 0);
    }

    #[test]
    fn adjust_moves_between_sizes() {
        let mut tracker = MemoryTracker::new();
        tracker.adjust(0, 500);
        assert_eq!(tracker.used_bytes(), 500);
        tracker.adjust(500, 200);
        assert_eq!(tracker.used_bytes(), 200);
    }

    #[test]
    fn remove_never_underflows() {
        let mut tracker = MemoryTracker::new();
        tracker.remove("key", &Value::String(Bytes::from_static(b"large value")));
        assert_eq!(tracker.used_bytes(), 0);
    }
}
