//! Hierarchical group storage over an ordered transactional key-value store
//!
//! This crate stores tables as parent/child forests ("groups"): each group
//! owns one contiguous key region in which ascending key order is exactly a
//! depth-first pre-order traversal of the logical forest. On top of that
//! layout it provides:
//! - An order-preserving, prefix-free hierarchical key (HKey) codec
//! - Group cursors yielding rows in depth-first pre-order
//! - A transaction-window manager that stitches many short-lived backing
//!   transactions into one gapless, duplicate-free logical scan
//! - An update propagator that relocates a row and, transitively, its
//!   descendants when a key-contributing column changes
//!
//! The backing store (`grove-kv`) supplies ordered range reads and
//! first-committer-wins transactions; everything above it is synchronous
//! and blocking, driven on the calling session's thread.

mod config;
mod cursor;
mod encoding;
mod engine;
mod error;
mod group;
mod hkey;
mod index;
mod metrics;
mod naming;
mod types;
mod window;
mod write;

pub use config::StoreConfig;
pub use cursor::GroupCursor;
pub use engine::GroupStore;
pub use error::{Error, Result};
pub use group::GroupSchema;
pub use hkey::{HKey, HKeySegment, KeyValue};
pub use index::IndexSpec;
pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use naming::{
    MAX_TREE_NAME_LENGTH, generate_group_tree_name, generate_index_tree_name,
    generate_sequence_tree_name,
};
pub use types::Row;
pub use types::schema::{Column, ParentJoin, Table, TableName};
pub use types::value::{DataType, Value};
pub use window::{GroupScan, ScanMode, ScanOptions};
