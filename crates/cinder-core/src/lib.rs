//! cinder-core: the storage engine.
//!
//! Owns the keyspace, data types, expiration, eviction, and the
//! multi-database container. Designed around a single-writer model:
//! one executor task exclusively owns the [`Databases`] value and all
//! mutations run serially inside it, so the containers themselves are
//! plain data structures with no internal locking.

pub mod databases;
pub mod error;
pub mod expiry;
pub mod glob;
pub mod keyspace;
pub mod memory;
pub mod time;
pub mod types;

pub use databases::{Databases, DEFAULT_DATABASE_COUNT};
pub use error::StoreError;
pub use keyspace::{
    EvictionPolicy, IncrError, IncrFloatError, Keyspace, KeyspaceConfig, KeyspaceStats,
    LSetError, RenameError, SetOutcome, TtlResult, WriteError, WrongType,
};
pub use types::sorted_set::ScoreBound;
pub use types::Value;
