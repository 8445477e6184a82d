use super::*;
use std::collections::HashSet;

use rand::seq::IteratorRandom;

impl Keyspace {
    /// Adds members to a set, creating it if the key doesn't exist.
    /// Returns the number of members that were newly added.
    pub fn sadd(&mut self, key: &str, members: &[String]) -> Result<usize, WriteError> {
        self.remove_if_expired(key);

        let is_new = self.ensure_collection_type(key, |v| matches!(v, Value::Set(_)))?;

        let estimated: usize = members.iter().map(|m| m.len() + 56).sum();
        if !self.ensure_capacity(estimated) {
            return Err(WriteError::OutOfMemory);
        }

        if is_new {
            self.insert_empty(key, Value::Set(HashSet::new()));
        }

        // skip the version bump when every member is already present
        let any_new = match self.entries.get(key).map(|e| &e.value) {
            Some(Value::Set(set)) => members.iter().any(|m| !set.contains(m)),
            _ => true,
        };
        if !any_new {
            return Ok(0);
        }

        let added = self
            .mutate_tracked(key, |entry| {
                let Value::Set(ref mut set) = entry.value else {
                    unreachable!("type verified by ensure_collection_type");
                };
                members.iter().filter(|m| set.insert((*m).clone())).count()
            })
            .expect("entry exists: inserted or confirmed above");

        Ok(added)
    }

    /// Removes members from a set. Returns the number actually removed.
    /// Deletes the key when the set empties.
    pub fn srem(&mut self, key: &str, members: &[String]) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::Set(set)) => {
                if !members.iter().any(|m| set.contains(m)) {
                    return Ok(0);
                }
                let removed = self
                    .mutate_tracked(key, |entry| {
                        let Value::Set(ref mut set) = entry.value else {
                            unreachable!("type verified above");
                        };
                        members.iter().filter(|m| set.remove(*m)).count()
                    })
                    .unwrap_or(0);
                self.drop_if_empty_collection(key);
                Ok(removed)
            }
            Some(_) => Err(WrongType),
        }
    }

    /// Returns every member of a set, in no particular order.
    pub fn smembers(&mut self, key: &str) -> Result<Vec<String>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        match self.entries.get_mut(key) {
            None => Ok(vec![]),
            Some(entry) => match &entry.value {
                Value::Set(set) => {
                    let members = set.iter().cloned().collect();
                    entry.touch();
                    Ok(members)
                }
                _ => Err(WrongType),
            },
        }
    }

    /// Returns `true` if `member` belongs to the set.
    pub fn sismember(&mut self, key: &str, member: &str) -> Result<bool, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(false);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(false),
            Some(Value::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(WrongType),
        }
    }

    /// Returns the cardinality of a set, or 0 if the key doesn't exist.
    pub fn scard(&mut self, key: &str) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::Set(set)) => Ok(set.len()),
            Some(_) => Err(WrongType),
        }
    }

    /// Returns `count` random members without removing them. A negative
    /// count allows repeats; a positive count returns distinct members
    /// capped at the cardinality.
    pub fn srandmember(&mut self, key: &str, count: i64) -> Result<Vec<String>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(vec![]),
            Some(Value::Set(set)) => {
                let mut rng = rand::rng();
                if count >= 0 {
                    Ok(set
                        .iter()
                        .choose_multiple(&mut rng, count as usize)
                        .into_iter()
                        .cloned()
                        .collect())
                } else {
                    let n = count.unsigned_abs() as usize;
                    let mut out = Vec::with_capacity(n);
                    for _ in 0..n {
                        if let Some(m) = set.iter().choose(&mut rng) {
                            out.push(m.clone());
                        }
                    }
                    Ok(out)
                }
            }
            Some(_) => Err(WrongType),
        }
    }

    /// Removes and returns up to `count` random members. Deletes the
    /// key when the set empties.
    pub fn spop(&mut self, key: &str, count: usize) -> Result<Vec<String>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(vec![]),
            Some(Value::Set(set)) => {
                let mut rng = rand::rng();
                let victims: Vec<String> = set
                    .iter()
                    .choose_multiple(&mut rng, count)
                    .into_iter()
                    .cloned()
                    .collect();
                if victims.is_empty() {
                    return Ok(vec![]);
                }
                self.mutate_tracked(key, |entry| {
                    let Value::Set(ref mut set) = entry.value else {
                        unreachable!("type verified above");
                    };
                    for m in &victims {
                        set.remove(m);
                    }
                });
                self.drop_if_empty_collection(key);
                Ok(victims)
            }
            Some(_) => Err(WrongType),
        }
    }

    /// Intersection of the sets at `key` and `others`. Missing keys are
    /// empty sets.
    pub fn sinter(&mut self, key: &str, others: &[String]) -> Result<Vec<String>, WrongType> {
        let mut acc: HashSet<String> = self.set_members(key)?;
        for other in others {
            let rhs = self.set_members(other)?;
            acc.retain(|m| rhs.contains(m));
            if acc.is_empty() {
                break;
            }
        }
        Ok(acc.into_iter().collect())
    }

    /// Union of the sets at `key` and `others`.
    pub fn sunion(&mut self, key: &str, others: &[String]) -> Result<Vec<String>, WrongType> {
        let mut acc = self.set_members(key)?;
        for other in others {
            acc.extend(self.set_members(other)?);
        }
        Ok(acc.into_iter().collect())
    }

    /// Difference of the set at `key` minus every set in `others`.
    pub fn sdiff(&mut self, key: &str, others: &[String]) -> Result<Vec<String>, WrongType> {
        let mut acc = self.set_members(key)?;
        for other in others {
            let rhs = self.set_members(other)?;
            acc.retain(|m| !rhs.contains(m));
            if acc.is_empty() {
                break;
            }
        }
        Ok(acc.into_iter().collect())
    }

    /// Moves `member` from the set at `src` to the set at `dst`.
    /// Returns `false` if the member wasn't in `src`.
    pub fn smove(&mut self, src: &str, dst: &str, member: &str) -> Result<bool, WriteError> {
        // both keys must be sets (or absent) before anything moves
        self.remove_if_expired(src);
        self.remove_if_expired(dst);
        for k in [src, dst] {
            if let Some(e) = self.entries.get(k) {
                if !matches!(e.value, Value::Set(_)) {
                    return Err(WriteError::WrongType);
                }
            }
        }

        let present = match self.entries.get(src).map(|e| &e.value) {
            Some(Value::Set(set)) => set.contains(member),
            _ => false,
        };
        if !present {
            return Ok(false);
        }

        self.srem(src, std::slice::from_ref(&member.to_owned()))
            .map_err(WriteError::from)?;
        self.sadd(dst, std::slice::from_ref(&member.to_owned()))?;
        Ok(true)
    }

    /// Clones a set's members for the pairwise algebra operations.
    fn set_members(&mut self, key: &str) -> Result<HashSet<String>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(HashSet::new());
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(HashSet::new()),
            Some(Value::Set(set)) => Ok(set.clone()),
            Some(_) => Err(WrongType),
        }
    }
}
