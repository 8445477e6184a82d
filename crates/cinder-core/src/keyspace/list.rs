use super::*;
use std::collections::VecDeque;
use crate::types::normalize_range;

/// Errors from LSET, which is the one list write that demands the key
/// and index both exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LSetError {
    WrongType,
    NoSuchKey,
    OutOfRange,
}

impl std::fmt::Display for LSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LSetError::WrongType => write!(f, "{WRONGTYPE_MSG}"),
            LSetError::NoSuchKey => write!(f, "ERR no such key"),
            LSetError::OutOfRange => write!(f, "ERR index out of range"),
        }
    }
}

impl std::error::Error for LSetError {}

impl Keyspace {
    /// Pushes one or more values to the head (left) of a list,
    /// creating the list if the key doesn't exist. Returns the new
    /// length.
    pub fn lpush(&mut self, key: &str, values: &[Bytes]) -> Result<usize, WriteError> {
        self.list_push(key, values, true)
    }

    /// Pushes one or more values to the tail (right) of a list,
    /// creating the list if the key doesn't exist. Returns the new
    /// length.
    pub fn rpush(&mut self, key: &str, values: &[Bytes]) -> Result<usize, WriteError> {
        self.list_push(key, values, false)
    }

    /// Pops a value from the head of a list. Returns `Ok(None)` if the
    /// key doesn't exist. Removes the key when the list empties.
    pub fn lpop(&mut self, key: &str) -> Result<Option<Bytes>, WrongType> {
        self.list_pop(key, true)
    }

    /// Pops a value from the tail of a list. Returns `Ok(None)` if the
    /// key doesn't exist. Removes the key when the list empties.
    pub fn rpop(&mut self, key: &str) -> Result<Option<Bytes>, WrongType> {
        self.list_pop(key, false)
    }

    /// Returns the inclusive `[start, stop]` slice of a list.
    ///
    /// Negative indices count from the end; out-of-bounds indices are
    /// clamped. Missing keys yield an empty vec.
    pub fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<Bytes>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        match self.entries.get_mut(key) {
            None => Ok(vec![]),
            Some(entry) => match &entry.value {
                Value::List(deque) => {
                    let len = deque.len() as i64;
                    let (s, e) = normalize_range(start, stop, len);
                    if s > e {
                        return Ok(vec![]);
                    }
                    let slice = deque
                        .iter()
                        .skip(s as usize)
                        .take((e - s + 1) as usize)
                        .cloned()
                        .collect();
                    entry.touch();
                    Ok(slice)
                }
                _ => Err(WrongType),
            },
        }
    }

    /// Returns the length of a list, or 0 if the key doesn't exist.
    pub fn llen(&mut self, key: &str) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::List(deque) => Ok(deque.len()),
                _ => Err(WrongType),
            },
        }
    }

    /// Returns the element at `index` (negative counts from the end),
    /// or `None` if the key or index doesn't exist.
    pub fn lindex(&mut self, key: &str, index: i64) -> Result<Option<Bytes>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        match self.entries.get_mut(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::List(deque) => {
                    let len = deque.len() as i64;
                    let i = if index < 0 { len + index } else { index };
                    if i < 0 || i >= len {
                        return Ok(None);
                    }
                    let item = deque.get(i as usize).cloned();
                    entry.touch();
                    Ok(item)
                }
                _ => Err(WrongType),
            },
        }
    }

    /// Replaces the element at `index`. The key and the index must both
    /// exist.
    pub fn lset(&mut self, key: &str, index: i64, value: Bytes) -> Result<(), LSetError> {
        if self.remove_if_expired(key) {
            return Err(LSetError::NoSuchKey);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => return Err(LSetError::NoSuchKey),
            Some(Value::List(deque)) => {
                let len = deque.len() as i64;
                let i = if index < 0 { len + index } else { index };
                if i < 0 || i >= len {
                    return Err(LSetError::OutOfRange);
                }
                let i = i as usize;
                self.mutate_tracked(key, |entry| {
                    let Value::List(ref mut deque) = entry.value else {
                        unreachable!("type verified above");
                    };
                    deque[i] = value;
                });
                Ok(())
            }
            Some(_) => Err(LSetError::WrongType),
        }
    }

    /// Trims the list to the inclusive `[start, stop]` slice. An empty
    /// resulting range deletes the key.
    pub fn ltrim(&mut self, key: &str, start: i64, stop: i64) -> Result<(), WrongType> {
        if self.remove_if_expired(key) {
            return Ok(());
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(()),
            Some(Value::List(deque)) => {
                let len = deque.len() as i64;
                let (s, e) = normalize_range(start, stop, len);
                self.mutate_tracked(key, |entry| {
                    let Value::List(ref mut deque) = entry.value else {
                        unreachable!("type verified above");
                    };
                    if s > e {
                        deque.clear();
                    } else {
                        deque.truncate((e + 1) as usize);
                        deque.drain(..(s as usize).min(deque.len()));
                    }
                });
                self.drop_if_empty_collection(key);
                Ok(())
            }
            Some(_) => Err(WrongType),
        }
    }

    /// Internal push implementation shared by lpush/rpush.
    fn list_push(&mut self, key: &str, values: &[Bytes], left: bool) -> Result<usize, WriteError> {
        self.remove_if_expired(key);

        let is_new = self.ensure_collection_type(key, |v| matches!(v, Value::List(_)))?;

        let estimated: usize = values.iter().map(|v| v.len() + 48).sum();
        if !self.ensure_capacity(estimated) {
            return Err(WriteError::OutOfMemory);
        }

        if is_new {
            self.insert_empty(key, Value::List(VecDeque::new()));
        }

        let len = self
            .mutate_tracked(key, |entry| {
                let Value::List(ref mut deque) = entry.value else {
                    unreachable!("type verified by ensure_collection_type");
                };
                for val in values {
                    if left {
                        deque.push_front(val.clone());
                    } else {
                        deque.push_back(val.clone());
                    }
                }
                deque.len()
            })
            .expect("entry exists: inserted or confirmed above");

        Ok(len)
    }

    /// Internal pop implementation shared by lpop/rpop.
    fn list_pop(&mut self, key: &str, left: bool) -> Result<Option<Bytes>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(None);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::List(_)) => {
                let popped = self
                    .mutate_tracked(key, |entry| {
                        let Value::List(ref mut deque) = entry.value else {
                            unreachable!("type verified above");
                        };
                        if left {
                            deque.pop_front()
                        } else {
                            deque.pop_back()
                        }
                    })
                    .flatten();
                self.drop_if_empty_collection(key);
                Ok(popped)
            }
            Some(_) => Err(WrongType),
        }
    }
}
