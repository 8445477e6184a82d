//! Error types for the core engine.

use thiserror::Error;

/// Errors returned by the store executor's handle.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store executor is no longer running (channel closed).
    #[error("store unavailable")]
    Unavailable,

    /// Memory limit reached and eviction policy is noeviction.
    #[error("OOM command not allowed when used memory > 'maxmemory'")]
    OutOfMemory,
}
