use super::*;
use crate::types::sorted_set::{AddResult, ScoreBound, SortedSet};

impl Keyspace {
    /// Adds or updates scored members in a sorted set, creating it if
    /// the key doesn't exist. Returns the number of members newly
    /// added (score updates of existing members don't count).
    pub fn zadd(&mut self, key: &str, members: &[(f64, String)]) -> Result<usize, WriteError> {
        self.remove_if_expired(key);

        let is_new = self.ensure_collection_type(key, |v| matches!(v, Value::SortedSet(_)))?;

        let estimated: usize = members.iter().map(|(_, m)| m.len() * 2 + 128).sum();
        if !self.ensure_capacity(estimated) {
            return Err(WriteError::OutOfMemory);
        }

        if is_new {
            self.insert_empty(key, Value::SortedSet(SortedSet::new()));
        }

        // a batch where every (score, member) already matches is a no-op
        let any_change = match self.entries.get(key).map(|e| &e.value) {
            Some(Value::SortedSet(ss)) => members
                .iter()
                .any(|(score, member)| ss.score(member) != Some(*score)),
            _ => true,
        };
        if !any_change {
            return Ok(0);
        }

        let added = self
            .mutate_tracked(key, |entry| {
                let Value::SortedSet(ref mut ss) = entry.value else {
                    unreachable!("type verified by ensure_collection_type");
                };
                members
                    .iter()
                    .filter(|(score, member)| ss.add(member.clone(), *score) == AddResult::Added)
                    .count()
            })
            .expect("entry exists: inserted or confirmed above");

        Ok(added)
    }

    /// Removes members from a sorted set. Returns the number actually
    /// removed. Deletes the key when the set empties.
    pub fn zrem(&mut self, key: &str, members: &[String]) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::SortedSet(ss)) => {
                if !members.iter().any(|m| ss.contains(m)) {
                    return Ok(0);
                }
                let removed = self
                    .mutate_tracked(key, |entry| {
                        let Value::SortedSet(ref mut ss) = entry.value else {
                            unreachable!("type verified above");
                        };
                        members.iter().filter(|m| ss.remove(m)).count()
                    })
                    .unwrap_or(0);
                self.drop_if_empty_collection(key);
                Ok(removed)
            }
            Some(_) => Err(WrongType),
        }
    }

    /// Returns the score of a member.
    pub fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::SortedSet(ss)) => Ok(ss.score(member)),
            Some(_) => Err(WrongType),
        }
    }

    /// Returns the cardinality of a sorted set, or 0 if absent.
    pub fn zcard(&mut self, key: &str) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::SortedSet(ss)) => Ok(ss.len()),
            Some(_) => Err(WrongType),
        }
    }

    /// Returns the rank of a member in the (score asc, member asc)
    /// order, or the reverse order when `reverse` is set.
    pub fn zrank(&mut self, key: &str, member: &str, reverse: bool) -> Result<Option<usize>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::SortedSet(ss)) => Ok(ss.rank(member, reverse)),
            Some(_) => Err(WrongType),
        }
    }

    /// Returns the inclusive rank range `[start, stop]` with scores.
    pub fn zrange(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
        reverse: bool,
    ) -> Result<Vec<(String, f64)>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        match self.entries.get_mut(key) {
            None => Ok(vec![]),
            Some(entry) => match &entry.value {
                Value::SortedSet(ss) => {
                    let items = ss
                        .range_by_rank(start, stop, reverse)
                        .into_iter()
                        .map(|(m, s)| (m.to_owned(), s))
                        .collect();
                    entry.touch();
                    Ok(items)
                }
                _ => Err(WrongType),
            },
        }
    }

    /// Returns members with scores inside `[min, max]`, ascending.
    pub fn zrange_by_score(
        &mut self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> Result<Vec<(String, f64)>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        match self.entries.get_mut(key) {
            None => Ok(vec![]),
            Some(entry) => match &entry.value {
                Value::SortedSet(ss) => {
                    let items = ss
                        .range_by_score(min, max)
                        .into_iter()
                        .map(|(m, s)| (m.to_owned(), s))
                        .collect();
                    entry.touch();
                    Ok(items)
                }
                _ => Err(WrongType),
            },
        }
    }

    /// Counts members with scores inside `[min, max]`.
    pub fn zcount(&mut self, key: &str, min: ScoreBound, max: ScoreBound) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::SortedSet(ss)) => Ok(ss.count_by_score(min, max)),
            Some(_) => Err(WrongType),
        }
    }

    /// Adds `delta` to a member's score, creating the member (and the
    /// set) if absent. A NaN result is rejected and nothing changes.
    pub fn zincrby(&mut self, key: &str, delta: f64, member: &str) -> Result<f64, IncrFloatError> {
        self.remove_if_expired(key);

        let current = match self.entries.get(key).map(|e| &e.value) {
            None => None,
            Some(Value::SortedSet(ss)) => ss.score(member),
            Some(_) => return Err(IncrFloatError::WrongType),
        };

        let new_score = current.unwrap_or(0.0) + delta;
        if new_score.is_nan() {
            return Err(IncrFloatError::NanOrInfinity);
        }

        match self.zadd(key, &[(new_score, member.to_owned())]) {
            Ok(_) => Ok(new_score),
            Err(WriteError::OutOfMemory) => Err(IncrFloatError::OutOfMemory),
            Err(WriteError::WrongType) => Err(IncrFloatError::WrongType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zadd(ks: &mut Keyspace, key: &str, members: &[(f64, &str)]) -> usize {
        let members: Vec<(f64, String)> =
            members.iter().map(|(s, m)| (*s, (*m).to_string())).collect();
        ks.zadd(key, &members).unwrap()
    }

    #[test]
    fn zadd_counts_new_members() {
        let mut ks = Keyspace::new();
        assert_eq!(zadd(&mut ks, "z", &[(1.0, "a"), (2.0, "b")]), 2);
        // score update is not a new member
        assert_eq!(zadd(&mut ks, "z", &[(9.0, "a"), (3.0, "c")]), 1);
        assert_eq!(ks.zcard("z").unwrap(), 3);
        assert_eq!(ks.zscore("z", "a").unwrap(), Some(9.0));
    }

    #[test]
    fn zrem_and_empty_deletion() {
        let mut ks = Keyspace::new();
        zadd(&mut ks, "z", &[(1.0, "a"), (2.0, "b")]);
        assert_eq!(ks.zrem("z", &["a".into(), "x".into()]).unwrap(), 1);
        assert_eq!(ks.zrem("z", &["b".into()]).unwrap(), 1);
        assert!(!ks.exists("z"));
    }

    #[test]
    fn zrank_forward_and_reverse() {
        let mut ks = Keyspace::new();
        zadd(&mut ks, "z", &[(3.0, "c"), (1.0, "a"), (2.0, "b")]);
        assert_eq!(ks.zrank("z", "a", false).unwrap(), Some(0));
        assert_eq!(ks.zrank("z", "c", false).unwrap(), Some(2));
        assert_eq!(ks.zrank("z", "c", true).unwrap(), Some(0));
        assert_eq!(ks.zrank("z", "missing", false).unwrap(), None);
        assert_eq!(ks.zrank("missing", "a", false).unwrap(), None);
    }

    #[test]
    fn zrange_orders_by_score_then_member() {
        let mut ks = Keyspace::new();
        zadd(&mut ks, "z", &[(1.0, "a"), (3.0, "c"), (2.0, "b")]);

        let range = ks.zrange("z", 0, -1, false).unwrap();
        assert_eq!(
            range,
            vec![("a".to_string(), 1.0), ("b".to_string(), 2.0), ("c".to_string(), 3.0)]
        );

        let rev = ks.zrange("z", 0, 0, true).unwrap();
        assert_eq!(rev, vec![("c".to_string(), 3.0)]);
    }

    #[test]
    fn zrange_by_score_and_count() {
        let mut ks = Keyspace::new();
        zadd(&mut ks, "z", &[(1.0, "a"), (2.0, "b"), (3.0, "c")]);

        let mid = ks
            .zrange_by_score("z", ScoreBound::Incl(1.5), ScoreBound::Incl(3.0))
            .unwrap();
        assert_eq!(mid, vec![("b".to_string(), 2.0), ("c".to_string(), 3.0)]);

        assert_eq!(
            ks.zcount("z", ScoreBound::NegInf, ScoreBound::PosInf).unwrap(),
            3
        );
        assert_eq!(
            ks.zcount("z", ScoreBound::Excl(1.0), ScoreBound::Incl(3.0)).unwrap(),
            2
        );
    }

    #[test]
    fn zincrby_creates_and_accumulates() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.zincrby("z", 2.5, "m").unwrap(), 2.5);
        assert_eq!(ks.zincrby("z", 1.5, "m").unwrap(), 4.0);
        assert_eq!(ks.zscore("z", "m").unwrap(), Some(4.0));
    }

    #[test]
    fn zincrby_rejects_nan() {
        let mut ks = Keyspace::new();
        ks.zincrby("z", f64::INFINITY, "m").unwrap();
        assert_eq!(
            ks.zincrby("z", f64::NEG_INFINITY, "m").unwrap_err(),
            IncrFloatError::NanOrInfinity
        );
        assert_eq!(ks.zscore("z", "m").unwrap(), Some(f64::INFINITY));
    }

    #[test]
    fn wrong_type_errors() {
        let mut ks = Keyspace::new();
        ks.set("s".into(), Bytes::from_static(b"v"), None, false, false);
        assert_eq!(
            ks.zadd("s", &[(1.0, "m".into())]).unwrap_err(),
            WriteError::WrongType
        );
        assert_eq!(ks.zscore("s", "m").unwrap_err(), WrongType);
        assert_eq!(ks.zrange("s", 0, -1, false).unwrap_err(), WrongType);
    }

    #[test]
    fn zadd_same_scores_does_not_bump_version() {
        let mut ks = Keyspace::new();
        zadd(&mut ks, "z", &[(1.0, "a")]);
        let v = ks.version("z").unwrap();
        zadd(&mut ks, "z", &[(1.0, "a")]);
        assert_eq!(ks.version("z"), Some(v));
        zadd(&mut ks, "z", &[(2.0, "a")]);
        assert!(ks.version("z").unwrap() > v);
    }
}
