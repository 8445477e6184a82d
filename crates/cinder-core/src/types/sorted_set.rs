//! Sorted set data structure: dual-indexed by score and member.
//!
//! Each member has a unique name and an associated `f64` score. Members
//! are ordered by (score, member) — ties in score are broken
//! lexicographically by member bytes.
//!
//! Implementation uses a `BTreeMap<(OrderedFloat<f64>, String), ()>` for
//! ordered iteration and a `HashMap<String, OrderedFloat<f64>>` for O(1)
//! member→score lookups. Both indexes are mutated together; membership
//! of one always equals membership of the other.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use ordered_float::OrderedFloat;

/// Result of a single add operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// A new member was inserted.
    Added,
    /// An existing member's score changed.
    Updated,
    /// The member already had this exact score.
    Unchanged,
}

/// One endpoint of a score interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    NegInf,
    /// Inclusive endpoint.
    Incl(f64),
    /// Exclusive endpoint (the `(score` syntax).
    Excl(f64),
    PosInf,
}

impl ScoreBound {
    /// True if `score` is at or above this bound, treating the bound
    /// as a lower limit.
    fn admits_from_below(&self, score: f64) -> bool {
        match *self {
            ScoreBound::NegInf => true,
            ScoreBound::Incl(min) => score >= min,
            ScoreBound::Excl(min) => score > min,
            ScoreBound::PosInf => false,
        }
    }

    /// True if `score` is at or below this bound, treating the bound
    /// as an upper limit.
    fn admits_from_above(&self, score: f64) -> bool {
        match *self {
            ScoreBound::NegInf => false,
            ScoreBound::Incl(max) => score <= max,
            ScoreBound::Excl(max) => score < max,
            ScoreBound::PosInf => true,
        }
    }
}

/// A sorted set of unique string members, each with a floating-point
/// score.
///
/// Rank is the 0-based position in the (score asc, member asc) total
/// order.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    /// Score→member index for ordered iteration.
    tree: BTreeIndex,
    /// Member→score index for O(1) lookups.
    scores: HashMap<String, OrderedFloat<f64>>,
}

type BTreeIndex = BTreeMap<(OrderedFloat<f64>, String), ()>;

impl SortedSet {
    /// Creates an empty sorted set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or updates a member with the given score.
    pub fn add(&mut self, member: String, score: f64) -> AddResult {
        let new_score = OrderedFloat(score);

        if let Some(&old_score) = self.scores.get(&member) {
            if new_score == old_score {
                return AddResult::Unchanged;
            }
            // update: remove old tree entry, insert new
            self.tree.remove(&(old_score, member.clone()));
            self.scores.insert(member.clone(), new_score);
            self.tree.insert((new_score, member), ());
            AddResult::Updated
        } else {
            self.scores.insert(member.clone(), new_score);
            self.tree.insert((new_score, member), ());
            AddResult::Added
        }
    }

    /// Removes a member. Returns `true` if it existed.
    pub fn remove(&mut self, member: &str) -> bool {
        if let Some(score) = self.scores.remove(member) {
            self.tree.remove(&(score, member.to_owned()));
            true
        } else {
            false
        }
    }

    /// Returns the score for a member, or `None` if not present.
    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).map(|s| s.0)
    }

    /// Adds `delta` to a member's score, inserting the member at
    /// `delta` if absent. Returns the new score.
    pub fn incr_by(&mut self, member: &str, delta: f64) -> f64 {
        let new_score = self.score(member).unwrap_or(0.0) + delta;
        self.add(member.to_owned(), new_score);
        new_score
    }

    /// Returns `true` if the member is present.
    pub fn contains(&self, member: &str) -> bool {
        self.scores.contains_key(member)
    }

    /// Returns the 0-based rank of a member (lowest score = rank 0),
    /// or the reverse rank when `reverse` is set.
    ///
    /// O(n) — walks the tree up to the target entry. Acceptable for
    /// small-to-medium sets; a skip list with rank counts would give
    /// O(log n) if this becomes a bottleneck.
    pub fn rank(&self, member: &str, reverse: bool) -> Option<usize> {
        let score = self.scores.get(member)?;
        let key = (*score, member.to_owned());
        let forward = self.tree.range(..&key).count();
        if reverse {
            Some(self.len() - 1 - forward)
        } else {
            Some(forward)
        }
    }

    /// Returns members in the given rank range, inclusive on both ends.
    /// Supports negative indices (-1 = last). When `reverse` is set,
    /// ranks count from the highest score and results come back in
    /// descending order.
    pub fn range_by_rank(&self, start: i64, stop: i64, reverse: bool) -> Vec<(&str, f64)> {
        let len = self.tree.len() as i64;
        let (s, e) = super::normalize_range(start, stop, len);
        if s > e {
            return Vec::new();
        }

        let s = s as usize;
        let e = e as usize;
        let take = e - s + 1;

        if reverse {
            self.tree
                .keys()
                .rev()
                .skip(s)
                .take(take)
                .map(|(score, member)| (member.as_str(), score.0))
                .collect()
        } else {
            self.tree
                .keys()
                .skip(s)
                .take(take)
                .map(|(score, member)| (member.as_str(), score.0))
                .collect()
        }
    }

    /// Returns members whose score falls within `[min, max]` in
    /// ascending order.
    pub fn range_by_score(&self, min: ScoreBound, max: ScoreBound) -> Vec<(&str, f64)> {
        self.score_range_iter(min, max)
            .map(|(score, member)| (member.as_str(), score.0))
            .collect()
    }

    /// Returns the number of members whose score falls within
    /// `[min, max]`.
    pub fn count_by_score(&self, min: ScoreBound, max: ScoreBound) -> usize {
        self.score_range_iter(min, max).count()
    }

    /// Walks the tree from the first entry admitted by `min` until the
    /// first one rejected by `max`.
    fn score_range_iter(
        &self,
        min: ScoreBound,
        max: ScoreBound,
    ) -> impl Iterator<Item = (&OrderedFloat<f64>, &String)> {
        // seek close to the lower bound; exclusive bounds still land on
        // equal scores, which the filter below skips.
        let start: Bound<(OrderedFloat<f64>, String)> = match min {
            ScoreBound::NegInf => Bound::Unbounded,
            ScoreBound::Incl(m) | ScoreBound::Excl(m) => {
                Bound::Included((OrderedFloat(m), String::new()))
            }
            ScoreBound::PosInf => Bound::Excluded((OrderedFloat(f64::INFINITY), String::new())),
        };

        self.tree
            .range((start, Bound::Unbounded))
            .map(|((score, member), ())| (score, member))
            .skip_while(move |(score, _)| !min.admits_from_below(score.0))
            .take_while(move |(score, _)| max.admits_from_above(score.0))
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns `true` if the sorted set has no members.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Returns an iterator over (member, score) pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.tree
            .keys()
            .map(|(score, member)| (member.as_str(), score.0))
    }
}
