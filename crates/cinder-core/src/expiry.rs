//! Active expiration via random sampling.
//!
//! Instead of maintaining a time wheel or sorted expiry structure, the
//! sweeper periodically samples random keys from the expiring-keys
//! index and deletes any that have passed their deadline. If a large
//! fraction of the sample was expired, it immediately goes again —
//! adaptive amortization that keeps up with bursts of expirations
//! without ever monopolizing the executor.

use crate::keyspace::Keyspace;

/// Maximum keys to sample per round.
const SAMPLE_SIZE: usize = 20;

/// If more than this fraction of the sample was expired, go again.
const EXPIRED_THRESHOLD: f64 = 0.25;

/// Maximum rounds per tick so a pathological backlog can't starve the
/// command loop.
const MAX_ROUNDS: usize = 4;

/// Runs one active expiration cycle on the keyspace.
///
/// Samples up to `SAMPLE_SIZE` keys from the expiring index per round,
/// removes expired ones, and repeats while more than 25% of the sample
/// was expired (up to `MAX_ROUNDS` total). Returns the number of keys
/// removed.
pub fn run_expiration_cycle(ks: &mut Keyspace) -> usize {
    let mut total_removed = 0;

    for _ in 0..MAX_ROUNDS {
        let (sampled, removed) = ks.expire_sample(SAMPLE_SIZE);
        total_removed += removed;

        if sampled == 0 {
            break;
        }
        // a mostly-clean sample means the index is in good shape
        if (removed as f64) < (sampled as f64) * EXPIRED_THRESHOLD {
            break;
        }
    }

    total_removed
}
