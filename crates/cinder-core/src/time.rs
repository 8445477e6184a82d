//! Wall-clock time utilities.
//!
//! Expirations are absolute unix-millisecond timestamps so that
//! PEXPIREAT and the snapshot's persisted deadlines mean the same
//! thing across process restarts.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns current wall-clock time as unix milliseconds.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Sentinel value meaning "no expiry".
pub const NO_EXPIRY: u64 = 0;

/// Returns true if the given expiry timestamp has passed.
///
/// An entry is expired when the current time strictly exceeds its
/// deadline.
#[inline]
pub fn is_expired(expires_at_ms: u64) -> bool {
    expires_at_ms != NO_EXPIRY && now_ms() > expires_at_ms
}

/// Returns remaining TTL in milliseconds, or None if no expiry.
#[inline]
pub fn remaining_ms(expires_at_ms: u64) -> Option<u64> {
    if expires_at_ms == NO_EXPIRY {
        None
    } else {
        Some(expires_at_ms.saturating_sub(now_ms()))
    }
}
