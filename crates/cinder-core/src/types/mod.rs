//! Data type representations for stored values.
//!
//! Each variant maps to one of the five container types. The enum is a
//! tagged union — dispatch is by tag match with exhaustive handling,
//! so a new variant is a compile error everywhere it matters.

pub mod sorted_set;

use std::collections::{HashMap, HashSet, VecDeque};

use bytes::Bytes;

use sorted_set::SortedSet;

/// A stored value in the keyspace.
#[derive(Debug, Clone)]
pub enum Value {
    /// Binary-safe string data. Uses `Bytes` for cheap cloning
    /// and zero-copy slicing.
    String(Bytes),

    /// Ordered list of binary-safe elements. `VecDeque` gives O(1)
    /// push/pop at both ends and good cache locality.
    List(VecDeque<Bytes>),

    /// Field → value mapping. Insertion order is irrelevant.
    Hash(HashMap<String, Bytes>),

    /// Unordered collection of unique string members.
    Set(HashSet<String>),

    /// Sorted set of unique string members, each with a float score.
    /// Members are ordered by (score, member name).
    SortedSet(SortedSet),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::SortedSet(a), Value::SortedSet(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((m1, s1), (m2, s2))| m1 == m2 && s1 == s2)
            }
            _ => false,
        }
    }
}

/// Returns the type name of a value, matching the TYPE command output.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::List(_) => "list",
        Value::Hash(_) => "hash",
        Value::Set(_) => "set",
        Value::SortedSet(_) => "zset",
    }
}

/// Converts Redis-style indices (supporting negative values) to a
/// clamped `(start, stop)` pair.
///
/// Negative indices count back from `len` (e.g. -1 = last element).
/// Out-of-bounds stop is clamped to `len - 1`; out-of-bounds negative
/// stop clamps to -1 so the caller sees `start > stop` (empty range).
/// Returns `(0, -1)` for empty collections.
pub fn normalize_range(start: i64, stop: i64, len: i64) -> (i64, i64) {
    if len == 0 {
        return (0, -1);
    }

    // resolve negative indices, clamp floor to 0
    let s = if start < 0 {
        (len + start).max(0)
    } else {
        start
    };

    // resolve negative indices, clamp floor to -1 so that a
    // hugely-negative stop produces an empty range
    let e = if stop < 0 {
        (len + stop).max(-1)
    } else {
        stop.min(len - 1)
    };

    (s, e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(type_name(&Value::String(Bytes::new())), "string");
        assert_eq!(type_name(&Value::List(VecDeque::new())), "list");
        assert_eq!(type_name(&Value::Hash(HashMap::new())), "hash");
        assert_eq!(type_name(&Value::Set(HashSet::new())), "set");
        assert_eq!(type_name(&Value::SortedSet(SortedSet::new())), "zset");
    }

    #[test]
    fn normalize_positive_indices() {
        assert_eq!(normalize_range(0, 2, 5), (0, 2));
        assert_eq!(normalize_range(0, 10, 5), (0, 4));
    }

    #[test]
    fn normalize_negative_indices() {
        assert_eq!(normalize_range(-3, -1, 5), (2, 4));
        assert_eq!(normalize_range(0, -1, 5), (0, 4));
        assert_eq!(normalize_range(-100, -1, 5), (0, 4));
    }

    #[test]
    fn normalize_empty_and_inverted() {
        assert_eq!(normalize_range(0, -1, 0), (0, -1));
        let (s, e) = normalize_range(3, 1, 5);
        assert!(s > e);
        // hugely negative stop yields an empty range
        let (s, e) = normalize_range(0, -100, 5);
        assert!(s > e);
    }
}
