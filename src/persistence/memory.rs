//! In-process persistence backend.

use super::Persistence;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Key/value map held in memory.
///
/// Share one instance (behind an `Arc`) between stores to give them a
/// common key space. Writes are counted so callers can check how often the
/// store writes through.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, String>>,
    writes: AtomicU64,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `set` calls since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Persistence for MemoryPersistence {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
