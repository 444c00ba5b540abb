//! Query chains.
//!
//! A query is an ordered pipeline of stateless stages (pattern select,
//! offset, limit). Stages are reduced left to right into one effective
//! [`Filter`], which the store applies the same way for reads, updates and
//! deletes. Because the pipeline keeps its order, "select then limit" and
//! "limit then select" are distinct queries.

mod chain;
mod stage;

pub use chain::QueryChain;
pub use stage::{Filter, FilterStage};
