//! Immutable, branchable query chains over a record store.

use crate::error::Result;
use crate::query::stage::{Filter, FilterStage};
use crate::store::RecordStore;
use crate::types::Record;

/// An ordered list of filter stages bound to the store it was derived from.
///
/// Every derivation returns a new chain and leaves `self` as it was, so a
/// chain can be reused as the common prefix of several queries:
///
/// ```ignore
/// let active = store.select(Record::new().with("active", true));
/// let first_page = active.limit(10);
/// let second_page = active.offset(11).limit(10);
/// ```
///
/// Terminal operations evaluate against the store's live sequence at call
/// time, not against a snapshot taken when the chain was built.
#[derive(Clone, Debug)]
pub struct QueryChain<'s> {
    store: &'s RecordStore,
    filter: Filter,
}

impl<'s> QueryChain<'s> {
    pub(crate) fn new(store: &'s RecordStore, filter: Filter) -> Self {
        Self { store, filter }
    }

    fn with_stage(&self, stage: FilterStage) -> Self {
        Self {
            store: self.store,
            filter: self.filter.then(stage),
        }
    }

    /// Keep records that subset-match `pattern`.
    pub fn select(&self, pattern: Record) -> Self {
        self.with_stage(FilterStage::Pattern(pattern))
    }

    /// Start at the `n`th record (1-indexed).
    pub fn offset(&self, n: usize) -> Self {
        self.with_stage(FilterStage::Offset(n))
    }

    /// Keep at most `n` records.
    pub fn limit(&self, n: usize) -> Self {
        self.with_stage(FilterStage::Limit(n))
    }

    pub fn stages(&self) -> &[FilterStage] {
        self.filter.stages()
    }

    /// The single filter equivalent to running every stage in order.
    pub fn effective_filter(&self) -> &Filter {
        &self.filter
    }

    /// The store this chain was derived from.
    pub fn store(&self) -> &'s RecordStore {
        self.store
    }

    pub fn get(&self) -> Vec<Record> {
        self.store.select_all(Some(&self.filter))
    }

    pub fn count(&self) -> usize {
        self.store.count(Some(&self.filter))
    }

    /// Delete the selected records from the originating store.
    pub fn delete(&self) -> Result<&'s RecordStore> {
        self.store.delete_matching(Some(&self.filter))
    }

    /// Merge `patch` into the selected records of the originating store.
    pub fn update(&self, patch: &Record) -> Result<&'s RecordStore> {
        self.store.update_matching(patch, Some(&self.filter))
    }
}
