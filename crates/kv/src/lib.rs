//! Ordered transactional key-value store
//!
//! This crate provides the storage substrate for the grove engine: a single
//! ordered byte-key space with short-lived transactions on top of a Fjall
//! keyspace. It supports:
//! - Read-your-own-writes within a transaction (non-snapshot reads)
//! - Snapshot reads pinned to the transaction's begin version
//! - First-committer-wins write-write conflict detection
//!
//! # Architecture
//!
//! Committed state lives in a single Fjall partition and always reflects the
//! latest committed version. Each transaction buffers its writes in memory
//! and applies them as one atomic Fjall batch at commit, under the store's
//! commit lock. Every commit is stamped with a monotonically increasing
//! version and its prior values are kept in an in-memory history, which is
//! how snapshot reads reconstruct the state as of an older version. History
//! is pruned up to the oldest live transaction's begin version, so it stays
//! bounded by transaction lifetimes rather than data volume.

mod config;
mod error;
mod store;
mod transaction;

pub use config::KvConfig;
pub use error::{Error, Result};
pub use store::TransactStore;
pub use transaction::Transaction;
