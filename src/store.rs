//! The record store: owns the live sequence and funnels every mutation.

use crate::error::{Result, StoreError};
use crate::persistence::{MemoryPersistence, Persistence};
use crate::query::{Filter, FilterStage, QueryChain};
use crate::types::{kind_of, Record};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Prepended to every persistence name to form the backend key.
    pub key_prefix: String,

    /// Whether insert, update and delete write through to persistence.
    /// `insert_many`, `persist` and `bind_persistence` always write.
    pub auto_persist: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "minidb_".to_string(),
            auto_persist: true,
        }
    }
}

/// Mutable state guarded by the store lock.
#[derive(Default)]
struct StoreState {
    records: Vec<Record>,

    /// Backend key, set by `bind_persistence`.
    key: Option<String>,

    /// In-memory data is authoritative over whatever the backend holds.
    authoritative: bool,
}

/// An ordered, in-process collection of records.
///
/// Queries are built with [`RecordStore::select`], [`RecordStore::offset`]
/// and [`RecordStore::limit`], which return a [`QueryChain`]. Mutating
/// methods return `&Self` so calls can be chained:
///
/// ```ignore
/// let store = RecordStore::from_value(json!([{"b": 2}, {"c": 5}]))?;
/// store.bind_persistence("users")?.limit(1).update(&patch)?;
/// ```
pub struct RecordStore {
    config: StoreConfig,
    backend: Arc<dyn Persistence>,
    state: Mutex<StoreState>,
}

impl RecordStore {
    /// Create an empty store. Binding persistence will load from the backend.
    pub fn new() -> Self {
        Self::with_state(StoreState::default())
    }

    /// Create a store seeded with `records`. Binding persistence will write them.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self::with_state(StoreState {
            records,
            key: None,
            authoritative: true,
        })
    }

    /// Create a store seeded from a JSON array of objects.
    ///
    /// Anything other than an array of objects fails with
    /// [`StoreError::InvalidInput`] and no store is created.
    pub fn from_value(value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(StoreError::InvalidInput(format!(
                    "initial data must be an array, got {}",
                    kind_of(&other)
                )))
            }
        };

        let records = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                Record::from_value(item).map_err(|e| match e {
                    StoreError::InvalidInput(msg) => {
                        StoreError::InvalidInput(format!("element {}: {}", i, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_records(records))
    }

    /// Create a store seeded from JSON text. See [`RecordStore::from_value`].
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| StoreError::InvalidInput(format!("initial data is not JSON: {}", e)))?;
        Self::from_value(value)
    }

    fn with_state(state: StoreState) -> Self {
        Self {
            config: StoreConfig::default(),
            backend: Arc::new(MemoryPersistence::new()),
            state: Mutex::new(state),
        }
    }

    /// Use `backend` for persistence instead of a private in-memory map.
    pub fn with_backend(mut self, backend: Arc<dyn Persistence>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The backend key currently bound, if any.
    pub fn persistence_key(&self) -> Option<String> {
        self.state.lock().key.clone()
    }

    // --- Persistence ---

    /// Bind the store to `key_prefix + name` in the backend.
    ///
    /// If the store already holds authoritative data it is written under the
    /// key. Otherwise the key is loaded; a missing or empty value leaves the
    /// store as it is. Rebinding switches the key without replaying the old
    /// key's value.
    pub fn bind_persistence(&self, name: &str) -> Result<&Self> {
        let key = format!("{}{}", self.config.key_prefix, name);
        let mut state = self.state.lock();

        if state.authoritative {
            self.write(&key, &state.records)?;
            tracing::debug!(
                target: "record_chain::store",
                key = %key,
                records = state.records.len(),
                "bound persistence, wrote current records"
            );
        } else {
            match self.backend.get(&key)?.filter(|stored| !stored.is_empty()) {
                Some(stored) => {
                    state.records = serde_json::from_str(&stored)?;
                    tracing::debug!(
                        target: "record_chain::store",
                        key = %key,
                        records = state.records.len(),
                        "bound persistence, loaded stored records"
                    );
                }
                None => {
                    tracing::debug!(
                        target: "record_chain::store",
                        key = %key,
                        "bound persistence, nothing stored yet"
                    );
                }
            }
        }

        state.key = Some(key);
        state.authoritative = true;
        Ok(self)
    }

    /// Write the full sequence to the bound key, if any.
    ///
    /// Returns whether a write happened.
    pub fn persist(&self) -> Result<bool> {
        let state = self.state.lock();
        self.write_through(&state)
    }

    fn write_through(&self, state: &StoreState) -> Result<bool> {
        match &state.key {
            Some(key) if state.authoritative => {
                self.write(key, &state.records)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn write_on_change(&self, state: &StoreState) -> Result<()> {
        if self.config.auto_persist {
            self.write_through(state)?;
        }
        Ok(())
    }

    fn write(&self, key: &str, records: &[Record]) -> Result<()> {
        let encoded = serde_json::to_string(records)?;
        self.backend.set(key, &encoded)?;
        tracing::trace!(
            target: "record_chain::store",
            key,
            records = records.len(),
            bytes = encoded.len(),
            "wrote through"
        );
        Ok(())
    }

    // --- Mutation ---

    /// Append `record`, writing through if persistence is bound.
    pub fn insert(&self, record: Record) -> Result<&Self> {
        self.insert_with(record, self.config.auto_persist)
    }

    /// Append `record`, writing through only if `persist` is set.
    pub fn insert_with(&self, record: Record, persist: bool) -> Result<&Self> {
        let mut state = self.state.lock();
        state.records.push(record);
        state.authoritative = true;
        if persist {
            self.write_through(&state)?;
        }
        Ok(self)
    }

    /// Append all `records` in order with a single write at the end.
    pub fn insert_many(&self, records: impl IntoIterator<Item = Record>) -> Result<&Self> {
        let mut state = self.state.lock();
        let before = state.records.len();
        state.records.extend(records);
        state.authoritative = true;
        self.write_through(&state)?;

        tracing::debug!(
            target: "record_chain::store",
            inserted = state.records.len() - before,
            "inserted batch"
        );
        Ok(self)
    }

    /// Remove exactly the records selected by `filter` (all when `None`).
    ///
    /// Removal is by position, so a structurally equal twin of a selected
    /// record survives unless it was selected too.
    pub fn delete_matching(&self, filter: Option<&Filter>) -> Result<&Self> {
        let mut state = self.state.lock();
        let selected = Self::positions(&state.records, filter);

        let mut doomed = vec![false; state.records.len()];
        for &pos in &selected {
            doomed[pos] = true;
        }
        let mut pos = 0;
        state.records.retain(|_| {
            let keep = !doomed[pos];
            pos += 1;
            keep
        });

        tracing::debug!(
            target: "record_chain::store",
            deleted = selected.len(),
            remaining = state.records.len(),
            "deleted records"
        );

        self.write_on_change(&state)?;
        Ok(self)
    }

    /// Delete every record.
    pub fn delete(&self) -> Result<&Self> {
        self.delete_matching(None)
    }

    /// Merge `patch` into each record selected by `filter` (all when `None`).
    pub fn update_matching(&self, patch: &Record, filter: Option<&Filter>) -> Result<&Self> {
        let mut state = self.state.lock();
        let selected = Self::positions(&state.records, filter);

        for &pos in &selected {
            state.records[pos].merge(patch);
        }

        tracing::debug!(
            target: "record_chain::store",
            updated = selected.len(),
            "updated records"
        );

        self.write_on_change(&state)?;
        Ok(self)
    }

    /// Merge `patch` into every record.
    pub fn update(&self, patch: &Record) -> Result<&Self> {
        self.update_matching(patch, None)
    }

    // --- Reads ---

    /// Records selected by `filter` (all when `None`), in sequence order.
    pub fn select_all(&self, filter: Option<&Filter>) -> Vec<Record> {
        let state = self.state.lock();
        match filter {
            Some(filter) => filter.apply(&state.records),
            None => state.records.clone(),
        }
    }

    /// Every record, in sequence order.
    pub fn get(&self) -> Vec<Record> {
        self.select_all(None)
    }

    /// Number of records selected by `filter` (all when `None`).
    pub fn count(&self, filter: Option<&Filter>) -> usize {
        let state = self.state.lock();
        match filter {
            Some(filter) => filter.positions(&state.records).len(),
            None => state.records.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    fn positions(records: &[Record], filter: Option<&Filter>) -> Vec<usize> {
        match filter {
            Some(filter) => filter.positions(records),
            None => (0..records.len()).collect(),
        }
    }

    // --- Queries ---

    /// A chain with no stages; selects every record.
    pub fn query(&self) -> QueryChain<'_> {
        QueryChain::new(self, Filter::identity())
    }

    /// Start a chain that keeps records subset-matching `pattern`.
    pub fn select(&self, pattern: Record) -> QueryChain<'_> {
        QueryChain::new(self, Filter::identity().then(FilterStage::Pattern(pattern)))
    }

    /// Start a chain at the `n`th record (1-indexed).
    pub fn offset(&self, n: usize) -> QueryChain<'_> {
        QueryChain::new(self, Filter::identity().then(FilterStage::Offset(n)))
    }

    /// Start a chain keeping at most `n` records.
    pub fn limit(&self, n: usize) -> QueryChain<'_> {
        QueryChain::new(self, Filter::identity().then(FilterStage::Limit(n)))
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RecordStore")
            .field("records", &state.records.len())
            .field("key", &state.key)
            .field("authoritative", &state.authoritative)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn records(value: Value) -> Vec<Record> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_new_store_is_empty_and_unbound() {
        let store = RecordStore::new();
        assert!(store.is_empty());
        assert_eq!(store.persistence_key(), None);
        assert!(!store.persist().unwrap());
    }

    #[test]
    fn test_from_value_rejects_non_array() {
        assert!(matches!(
            RecordStore::from_value(json!({"a": 1})),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            RecordStore::from_value(json!([{"a": 1}, 2])),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            RecordStore::from_json("not json"),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_delete_by_position_keeps_unselected_twin() {
        let store = RecordStore::from_value(json!([{"a": 1}, {"b": 2}, {"a": 1}])).unwrap();
        store.select(rec(json!({"a": 1}))).limit(1).delete().unwrap();
        assert_eq!(store.get(), records(json!([{"b": 2}, {"a": 1}])));
    }

    #[test]
    fn test_update_merges_into_selected_only() {
        let store = RecordStore::from_value(json!([{"b": 2}, {"c": 5}])).unwrap();
        let first = Filter::identity().then(FilterStage::Limit(1));
        store.update_matching(&rec(json!({"b": 1})), Some(&first)).unwrap();
        assert_eq!(store.get(), records(json!([{"b": 1}, {"c": 5}])));
    }

    #[test]
    fn test_count_matches_select_all() {
        let store = RecordStore::from_value(json!([{"a": 1}, {"a": 2}, {"a": 1}])).unwrap();
        let filter = Filter::identity().then(FilterStage::Pattern(rec(json!({"a": 1}))));
        assert_eq!(store.count(Some(&filter)), store.select_all(Some(&filter)).len());
        assert_eq!(store.count(None), 3);
    }

    #[test]
    fn test_write_through_only_after_bind() {
        let backend = Arc::new(MemoryPersistence::new());
        let store = RecordStore::new().with_backend(backend.clone());

        store.insert(rec(json!({"a": 1}))).unwrap();
        assert_eq!(backend.write_count(), 0);

        store.bind_persistence("t").unwrap();
        assert_eq!(backend.write_count(), 1);

        store.insert(rec(json!({"a": 2}))).unwrap();
        assert_eq!(backend.write_count(), 2);
        assert_eq!(
            backend.get("minidb_t").unwrap().as_deref(),
            Some("[{\"a\":1},{\"a\":2}]")
        );
    }

    #[test]
    fn test_insert_with_skips_write() {
        let backend = Arc::new(MemoryPersistence::new());
        let store = RecordStore::from_records(vec![]).with_backend(backend.clone());
        store.bind_persistence("t").unwrap();
        assert_eq!(backend.write_count(), 1);

        store.insert_with(rec(json!({"a": 1})), false).unwrap();
        assert_eq!(backend.write_count(), 1);
        assert_eq!(backend.get("minidb_t").unwrap().as_deref(), Some("[]"));

        store.insert_with(rec(json!({"a": 2})), true).unwrap();
        assert_eq!(backend.write_count(), 2);
        assert_eq!(
            backend.get("minidb_t").unwrap().as_deref(),
            Some("[{\"a\":1},{\"a\":2}]")
        );
    }

    #[test]
    fn test_auto_persist_disabled() {
        let backend = Arc::new(MemoryPersistence::new());
        let store = RecordStore::from_value(json!([{"a": 1}]))
            .unwrap()
            .with_backend(backend.clone())
            .with_config(StoreConfig {
                auto_persist: false,
                ..Default::default()
            });
        store.bind_persistence("t").unwrap();
        assert_eq!(backend.write_count(), 1);

        store.insert(rec(json!({"a": 2}))).unwrap();
        store.update(&rec(json!({"z": 0}))).unwrap();
        store.limit(1).delete().unwrap();
        assert_eq!(backend.write_count(), 1);

        assert!(store.persist().unwrap());
        assert_eq!(backend.write_count(), 2);
        assert_eq!(backend.get("minidb_t").unwrap().as_deref(), Some("[{\"a\":2,\"z\":0}]"));
    }

    #[test]
    fn test_custom_key_prefix() {
        let backend = Arc::new(MemoryPersistence::new());
        let store = RecordStore::from_records(vec![rec(json!({"a": 1}))])
            .with_backend(backend.clone())
            .with_config(StoreConfig {
                key_prefix: "app/".to_string(),
                ..Default::default()
            });
        store.bind_persistence("users").unwrap();
        assert_eq!(store.persistence_key().as_deref(), Some("app/users"));
        assert!(backend.contains_key("app/users"));
    }

    #[test]
    fn test_empty_stored_value_counts_as_absent() {
        let backend = Arc::new(MemoryPersistence::new());
        backend.set("minidb_blank", "").unwrap();
        let store = RecordStore::new().with_backend(backend.clone());

        store.bind_persistence("blank").unwrap();
        assert!(store.is_empty());
        assert_eq!(store.persistence_key().as_deref(), Some("minidb_blank"));

        store.insert(rec(json!({"a": 1}))).unwrap();
        assert_eq!(backend.get("minidb_blank").unwrap().as_deref(), Some("[{\"a\":1}]"));
    }

    #[test]
    fn test_load_rejects_corrupt_value() {
        let backend = Arc::new(MemoryPersistence::new());
        backend.set("minidb_bad", "{not json").unwrap();
        let store = RecordStore::new().with_backend(backend);
        assert!(matches!(
            store.bind_persistence("bad"),
            Err(StoreError::Deserialization(_))
        ));
    }
}
