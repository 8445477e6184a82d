use super::*;
use std::collections::HashMap;

impl Keyspace {
    /// Sets field/value pairs on a hash, creating it if the key doesn't
    /// exist. Returns the number of fields that were newly created
    /// (updates of existing fields don't count).
    pub fn hset(&mut self, key: &str, fields: &[(String, Bytes)]) -> Result<usize, WriteError> {
        self.remove_if_expired(key);

        let is_new = self.ensure_collection_type(key, |v| matches!(v, Value::Hash(_)))?;

        let estimated: usize = fields.iter().map(|(f, v)| f.len() + v.len() + 64).sum();
        if !self.ensure_capacity(estimated) {
            return Err(WriteError::OutOfMemory);
        }

        if is_new {
            self.insert_empty(key, Value::Hash(HashMap::new()));
        }

        let added = self
            .mutate_tracked(key, |entry| {
                let Value::Hash(ref mut map) = entry.value else {
                    unreachable!("type verified by ensure_collection_type");
                };
                let mut added = 0;
                for (field, value) in fields {
                    if map.insert(field.clone(), value.clone()).is_none() {
                        added += 1;
                    }
                }
                added
            })
            .expect("entry exists: inserted or confirmed above");

        Ok(added)
    }

    /// Sets a field only if it doesn't already exist. Returns `true`
    /// if the field was set.
    pub fn hsetnx(&mut self, key: &str, field: &str, value: Bytes) -> Result<bool, WriteError> {
        self.remove_if_expired(key);

        match self.entries.get(key).map(|e| &e.value) {
            Some(Value::Hash(map)) if map.contains_key(field) => return Ok(false),
            Some(Value::Hash(_)) | None => {}
            Some(_) => return Err(WriteError::WrongType),
        }
        self.hset(key, &[(field.to_owned(), value)])?;
        Ok(true)
    }

    /// Returns the value of a field, or `None` if the key or field is
    /// missing.
    pub fn hget(&mut self, key: &str, field: &str) -> Result<Option<Bytes>, WrongType> {
        if self.remove_if_expired(key) {
            self.record_miss();
            return Ok(None);
        }
        match self.entries.get_mut(key) {
            None => {
                self.record_miss();
                Ok(None)
            }
            Some(entry) => match &entry.value {
                Value::Hash(map) => {
                    let val = map.get(field).cloned();
                    entry.touch();
                    if val.is_some() {
                        self.record_hit();
                    } else {
                        self.record_miss();
                    }
                    Ok(val)
                }
                _ => Err(WrongType),
            },
        }
    }

    /// Removes fields from a hash. Returns the number actually removed.
    /// Deletes the key when the hash empties.
    pub fn hdel(&mut self, key: &str, fields: &[String]) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::Hash(map)) => {
                // only bump the version when something will actually go
                if !fields.iter().any(|f| map.contains_key(f)) {
                    return Ok(0);
                }
                let removed = self
                    .mutate_tracked(key, |entry| {
                        let Value::Hash(ref mut map) = entry.value else {
                            unreachable!("type verified above");
                        };
                        fields.iter().filter(|f| map.remove(*f).is_some()).count()
                    })
                    .unwrap_or(0);
                self.drop_if_empty_collection(key);
                Ok(removed)
            }
            Some(_) => Err(WrongType),
        }
    }

    /// Returns `true` if the field exists.
    pub fn hexists(&mut self, key: &str, field: &str) -> Result<bool, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(false);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(false),
            Some(Value::Hash(map)) => Ok(map.contains_key(field)),
            Some(_) => Err(WrongType),
        }
    }

    /// Returns the number of fields, or 0 if the key doesn't exist.
    pub fn hlen(&mut self, key: &str) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::Hash(map)) => Ok(map.len()),
            Some(_) => Err(WrongType),
        }
    }

    /// Returns every field/value pair.
    pub fn hgetall(&mut self, key: &str) -> Result<Vec<(String, Bytes)>, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(vec![]);
        }
        match self.entries.get_mut(key) {
            None => Ok(vec![]),
            Some(entry) => match &entry.value {
                Value::Hash(map) => {
                    let pairs = map.iter().map(|(f, v)| (f.clone(), v.clone())).collect();
                    entry.touch();
                    Ok(pairs)
                }
                _ => Err(WrongType),
            },
        }
    }

    /// Returns all field names.
    pub fn hkeys(&mut self, key: &str) -> Result<Vec<String>, WrongType> {
        Ok(self.hgetall(key)?.into_iter().map(|(f, _)| f).collect())
    }

    /// Returns all field values.
    pub fn hvals(&mut self, key: &str) -> Result<Vec<Bytes>, WrongType> {
        Ok(self.hgetall(key)?.into_iter().map(|(_, v)| v).collect())
    }

    /// Adds `delta` to the integer value of a field, creating the field
    /// (and the hash) at 0 if absent. A field that doesn't parse as a
    /// canonical integer is an error, never a silent zero.
    pub fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Result<i64, IncrError> {
        self.remove_if_expired(key);

        let current = match self.entries.get(key).map(|e| &e.value) {
            None => 0,
            Some(Value::Hash(map)) => match map.get(field) {
                None => 0,
                Some(data) => parse_i64_strict(data)?,
            },
            Some(_) => return Err(IncrError::WrongType),
        };

        let new_val = current.checked_add(delta).ok_or(IncrError::Overflow)?;
        match self.hset(key, &[(field.to_owned(), Bytes::from(new_val.to_string()))]) {
            Ok(_) => Ok(new_val),
            Err(WriteError::OutOfMemory) => Err(IncrError::OutOfMemory),
            Err(WriteError::WrongType) => Err(IncrError::WrongType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn pair(f: &str, v: &str) -> (String, Bytes) {
        (f.to_owned(), b(v))
    }

    #[test]
    fn hset_and_hget() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.hset("h", &[pair("name", "alice")]).unwrap(), 1);
        assert_eq!(ks.hget("h", "name").unwrap(), Some(b("alice")));
        assert_eq!(ks.hget("h", "missing").unwrap(), None);
        assert_eq!(ks.hget("nope", "f").unwrap(), None);
    }

    #[test]
    fn hset_counts_only_new_fields() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.hset("h", &[pair("a", "1"), pair("b", "2")]).unwrap(), 2);
        assert_eq!(ks.hset("h", &[pair("a", "9"), pair("c", "3")]).unwrap(), 1);
        assert_eq!(ks.hget("h", "a").unwrap(), Some(b("9")));
        assert_eq!(ks.hlen("h").unwrap(), 3);
    }

    #[test]
    fn hsetnx_only_sets_absent_field() {
        let mut ks = Keyspace::new();
        assert!(ks.hsetnx("h", "f", b("1")).unwrap());
        assert!(!ks.hsetnx("h", "f", b("2")).unwrap());
        assert_eq!(ks.hget("h", "f").unwrap(), Some(b("1")));
    }

    #[test]
    fn hdel_removes_and_counts() {
        let mut ks = Keyspace::new();
        ks.hset("h", &[pair("a", "1"), pair("b", "2"), pair("c", "3")]).unwrap();
        assert_eq!(
            ks.hdel("h", &["a".into(), "b".into(), "zzz".into()]).unwrap(),
            2
        );
        assert_eq!(ks.hlen("h").unwrap(), 1);
        assert_eq!(ks.hdel("missing", &["f".into()]).unwrap(), 0);
    }

    #[test]
    fn empty_hash_is_deleted() {
        let mut ks = Keyspace::new();
        ks.hset("h", &[pair("only", "1")]).unwrap();
        ks.hdel("h", &["only".into()]).unwrap();
        assert!(!ks.exists("h"));
    }

    #[test]
    fn hdel_of_absent_fields_does_not_bump_version() {
        let mut ks = Keyspace::new();
        ks.hset("h", &[pair("a", "1")]).unwrap();
        let v = ks.version("h").unwrap();
        ks.hdel("h", &["zzz".into()]).unwrap();
        assert_eq!(ks.version("h"), Some(v));
    }

    #[test]
    fn hexists_and_hlen() {
        let mut ks = Keyspace::new();
        ks.hset("h", &[pair("f", "v")]).unwrap();
        assert!(ks.hexists("h", "f").unwrap());
        assert!(!ks.hexists("h", "g").unwrap());
        assert!(!ks.hexists("nope", "f").unwrap());
        assert_eq!(ks.hlen("h").unwrap(), 1);
        assert_eq!(ks.hlen("nope").unwrap(), 0);
    }

    #[test]
    fn hgetall_hkeys_hvals() {
        let mut ks = Keyspace::new();
        ks.hset("h", &[pair("a", "1"), pair("b", "2")]).unwrap();

        let mut all = ks.hgetall("h").unwrap();
        all.sort();
        assert_eq!(all, vec![pair("a", "1"), pair("b", "2")]);

        let mut keys = ks.hkeys("h").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);

        let mut vals = ks.hvals("h").unwrap();
        vals.sort();
        assert_eq!(vals, vec![b("1"), b("2")]);

        assert!(ks.hgetall("missing").unwrap().is_empty());
    }

    #[test]
    fn hincrby_creates_and_accumulates() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.hincrby("h", "count", 5).unwrap(), 5);
        assert_eq!(ks.hincrby("h", "count", -2).unwrap(), 3);
        assert_eq!(ks.hget("h", "count").unwrap(), Some(b("3")));
    }

    #[test]
    fn hincrby_non_integer_is_error() {
        let mut ks = Keyspace::new();
        ks.hset("h", &[pair("f", "abc")]).unwrap();
        assert_eq!(ks.hincrby("h", "f", 1).unwrap_err(), IncrError::NotAnInteger);
        // unchanged
        assert_eq!(ks.hget("h", "f").unwrap(), Some(b("abc")));
    }

    #[test]
    fn hincrby_rejects_plus_sign_and_padding() {
        // same strict integer rules as INCR: no '+', no whitespace
        let mut ks = Keyspace::new();
        ks.hset("h", &[pair("p", "+5"), pair("w", " 1 ")]).unwrap();
        assert_eq!(ks.hincrby("h", "p", 1).unwrap_err(), IncrError::NotAnInteger);
        assert_eq!(ks.hincrby("h", "w", 1).unwrap_err(), IncrError::NotAnInteger);
    }

    #[test]
    fn hincrby_overflow_is_error() {
        let mut ks = Keyspace::new();
        ks.hset("h", &[pair("f", &i64::MAX.to_string())]).unwrap();
        assert_eq!(ks.hincrby("h", "f", 1).unwrap_err(), IncrError::Overflow);
    }

    #[test]
    fn wrong_type_errors() {
        let mut ks = Keyspace::new();
        ks.set("s".into(), b("v"), None, false, false);
        assert_eq!(ks.hset("s", &[pair("f", "v")]).unwrap_err(), WriteError::WrongType);
        assert_eq!(ks.hget("s", "f").unwrap_err(), WrongType);
        assert_eq!(ks.hincrby("s", "f", 1).unwrap_err(), IncrError::WrongType);
    }
}
