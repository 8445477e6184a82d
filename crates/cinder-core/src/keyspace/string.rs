use super::*;

impl Keyspace {
    /// Retrieves the raw bytes for a string key, or `None` if the key
    /// is missing or expired. `Bytes::clone()` is a cheap refcount
    /// increment.
    ///
    /// Returns `Err(WrongType)` if the key holds a non-string value.
    /// Successful reads update the entry's access metadata.
    pub fn get_string(&mut self, key: &str) -> Result<Option<Bytes>, WrongType> {
        if self.remove_if_expired(key) {
            self.record_miss();
            return Ok(None);
        }
        match self.entries.get_mut(key) {
            Some(e) => match &e.value {
                Value::String(b) => {
                    let data = b.clone();
                    e.touch();
                    self.record_hit();
                    Ok(Some(data))
                }
                _ => Err(WrongType),
            },
            None => {
                self.record_miss();
                Ok(None)
            }
        }
    }

    /// Returns the type name of the value at `key`, or "none" if missing.
    pub fn value_type(&mut self, key: &str) -> &'static str {
        if self.remove_if_expired(key) {
            return "none";
        }
        match self.entries.get(key) {
            Some(e) => types::type_name(&e.value),
            None => "none",
        }
    }

    /// Stores a string key with optional NX/XX conditions and an
    /// optional absolute expiration.
    ///
    /// - `nx`: only set if the key does NOT already exist
    /// - `xx`: only set if the key DOES already exist
    ///
    /// An existing entry is replaced entirely: a plain SET clears any
    /// previous TTL.
    pub fn set(
        &mut self,
        key: String,
        value: Bytes,
        expires_at_ms: Option<u64>,
        nx: bool,
        xx: bool,
    ) -> SetOutcome {
        let expires_at_ms = expires_at_ms.unwrap_or(time::NO_EXPIRY);
        let new_value = Value::String(value);
        let new_size = memory::entry_size(&key, &new_value);

        // treat an expired entry as absent for the NX/XX checks
        self.remove_if_expired(&key);
        let old = self.entries.get(key.as_str());
        let key_exists = old.is_some();
        if nx && key_exists {
            return SetOutcome::Blocked;
        }
        if xx && !key_exists {
            return SetOutcome::Blocked;
        }

        // for overwrites only the net increase matters
        let old_size = old
            .map(|e| memory::entry_size(&key, &e.value))
            .unwrap_or(0);
        if !self.ensure_capacity(new_size.saturating_sub(old_size)) {
            return SetOutcome::OutOfMemory;
        }

        // the eviction pass above may have freed the old entry; re-probe
        if let Some(old_entry) = self.entries.remove(key.as_str()) {
            self.memory.remove(&key, &old_entry.value);
            self.expiring.remove(key.as_str());
        }

        self.memory.add(&key, &new_value);
        if expires_at_ms != time::NO_EXPIRY {
            self.expiring.insert(Box::from(key.as_str()));
        }
        let version = self.next_version();
        self.entries
            .insert(key.into_boxed_str(), Entry::new(new_value, expires_at_ms, version));
        SetOutcome::Done
    }

    /// Adds `delta` to the current integer value of the key, creating
    /// it at 0 if absent. Used by INCR, DECR, INCRBY, and DECRBY.
    ///
    /// The current contents must be a canonical signed 64-bit integer;
    /// overflow is a failure, not a wrap. The existing TTL is preserved.
    pub fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64, IncrError> {
        self.remove_if_expired(key);

        let (current, expire) = match self.entries.get(key) {
            Some(entry) => {
                let val = match &entry.value {
                    Value::String(data) => parse_i64_strict(data)?,
                    _ => return Err(IncrError::WrongType),
                };
                (val, entry.expires_at_ms)
            }
            None => (0, time::NO_EXPIRY),
        };

        let new_val = current.checked_add(delta).ok_or(IncrError::Overflow)?;
        let expire = (expire != time::NO_EXPIRY).then_some(expire);
        match self.set(key.to_owned(), Bytes::from(new_val.to_string()), expire, false, false) {
            SetOutcome::Done | SetOutcome::Blocked => Ok(new_val),
            SetOutcome::OutOfMemory => Err(IncrError::OutOfMemory),
        }
    }

    /// Adds a float `delta` to the current value of the key, creating
    /// it at 0 if absent. Used by INCRBYFLOAT.
    ///
    /// Returns the new value formatted as a string; a NaN or infinite
    /// result is rejected. The existing TTL is preserved.
    pub fn incr_by_float(&mut self, key: &str, delta: f64) -> Result<String, IncrFloatError> {
        self.remove_if_expired(key);

        let (current, expire) = match self.entries.get(key) {
            Some(entry) => {
                let val = match &entry.value {
                    Value::String(data) => std::str::from_utf8(data)
                        .ok()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .ok_or(IncrFloatError::NotAFloat)?,
                    _ => return Err(IncrFloatError::WrongType),
                };
                (val, entry.expires_at_ms)
            }
            None => (0.0, time::NO_EXPIRY),
        };

        let new_val = current + delta;
        if new_val.is_nan() || new_val.is_infinite() {
            return Err(IncrFloatError::NanOrInfinity);
        }

        let formatted = format_float(new_val);
        let expire = (expire != time::NO_EXPIRY).then_some(expire);
        match self.set(
            key.to_owned(),
            Bytes::copy_from_slice(formatted.as_bytes()),
            expire,
            false,
            false,
        ) {
            SetOutcome::Done | SetOutcome::Blocked => Ok(formatted),
            SetOutcome::OutOfMemory => Err(IncrFloatError::OutOfMemory),
        }
    }

    /// Appends bytes to an existing string key, creating it if absent.
    /// Returns the new string length. The existing TTL is preserved.
    pub fn append(&mut self, key: &str, value: &[u8]) -> Result<usize, WriteError> {
        self.remove_if_expired(key);

        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::String(existing) => {
                    let mut new_data = Vec::with_capacity(existing.len() + value.len());
                    new_data.extend_from_slice(existing);
                    new_data.extend_from_slice(value);
                    let new_len = new_data.len();
                    let expire = entry.expires_at_ms;
                    let expire = (expire != time::NO_EXPIRY).then_some(expire);
                    match self.set(key.to_owned(), Bytes::from(new_data), expire, false, false) {
                        SetOutcome::Done | SetOutcome::Blocked => Ok(new_len),
                        SetOutcome::OutOfMemory => Err(WriteError::OutOfMemory),
                    }
                }
                _ => Err(WriteError::WrongType),
            },
            None => {
                let new_len = value.len();
                match self.set(
                    key.to_owned(),
                    Bytes::copy_from_slice(value),
                    None,
                    false,
                    false,
                ) {
                    SetOutcome::Done | SetOutcome::Blocked => Ok(new_len),
                    SetOutcome::OutOfMemory => Err(WriteError::OutOfMemory),
                }
            }
        }
    }

    /// Returns the length of the string at `key`, or 0 if absent.
    pub fn strlen(&mut self, key: &str) -> Result<usize, WrongType> {
        if self.remove_if_expired(key) {
            return Ok(0);
        }
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::String(data) => Ok(data.len()),
                _ => Err(WrongType),
            },
            None => Ok(0),
        }
    }
}
