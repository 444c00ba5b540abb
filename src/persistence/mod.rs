//! Persistence backends.
//!
//! The store only needs a string key/value interface: read the value at a
//! key, or replace it. Every write carries the full serialized record
//! sequence, so backends never see partial updates.

mod file;
mod memory;

pub use file::FilePersistence;
pub use memory::MemoryPersistence;

use crate::error::Result;

/// Host-provided key/value string store.
///
/// The store calls `get` and `set` while holding its own lock, so an
/// implementation must never call back into a `RecordStore` that uses it;
/// such a call deadlocks.
pub trait Persistence: Send + Sync {
    /// Read the value at `key`, or `None` if nothing was stored there.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value at `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}
