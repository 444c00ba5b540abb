//! # Record Chain
//!
//! An embedded, in-process record store with composable query chains and
//! optional write-through persistence to a key/value backend.
//!
//! ## Core Concepts
//!
//! - **Records**: string-keyed maps of JSON values, kept in insertion order
//! - **Query chains**: immutable pipelines of pattern, offset and limit stages
//! - **Effective filter**: a chain's stages reduced in chaining order, applied
//!   identically by reads, updates and deletes
//! - **Persistence**: the full sequence written through on every change to a
//!   [`Persistence`] backend under `key_prefix + name`
//!
//! ## Example
//!
//! ```ignore
//! use record_chain::{Record, RecordStore};
//! use serde_json::json;
//!
//! let store = RecordStore::from_value(json!([{"b": 2}, {"c": 5}, {"c": 5, "b": 1}]))?;
//! store.bind_persistence("example")?;
//!
//! // Remove the one record with both c = 5 and b = 1
//! let c5 = Record::from_value(json!({"c": 5}))?;
//! let b1 = Record::from_value(json!({"b": 1}))?;
//! store.select(c5).select(b1).delete()?;
//!
//! // Tag the first record
//! store.limit(1).update(&Record::new().with("first", true))?;
//! ```

pub mod error;
pub mod persistence;
pub mod query;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use persistence::{FilePersistence, MemoryPersistence, Persistence};
pub use query::{Filter, FilterStage, QueryChain};
pub use store::{RecordStore, StoreConfig};
pub use types::Record;
