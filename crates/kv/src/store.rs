//! Store handle and commit machinery

use crate::config::KvConfig;
use crate::error::{Error, Result};
use crate::transaction::Transaction;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One key's prior value, recorded when a commit overwrote it
pub(crate) type PriorValue = Option<Vec<u8>>;

/// State guarded by the store's commit lock
pub(crate) struct CommitState {
    /// Version of the most recent commit
    pub(crate) version: u64,
    /// Commit version -> (key, prior value) pairs written by that commit.
    /// Priors are what snapshot reads splice back in; pruned up to the
    /// oldest live transaction's begin version.
    pub(crate) history: BTreeMap<u64, Vec<(Vec<u8>, PriorValue)>>,
    /// Begin version -> count of live transactions pinned there
    pub(crate) live: BTreeMap<u64, usize>,
}

pub(crate) struct StoreInner {
    pub(crate) keyspace: Keyspace,
    pub(crate) data: PartitionHandle,
    persist_mode: PersistMode,
    pub(crate) state: Mutex<CommitState>,
}

/// An ordered, transactional key-value store
///
/// Cheap to clone; all clones share the same underlying keyspace and
/// commit state.
#[derive(Clone)]
pub struct TransactStore {
    inner: Arc<StoreInner>,
}

impl TransactStore {
    /// Open (or create) a store at the configured path.
    pub fn open(config: KvConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let keyspace = fjall::Config::new(&config.data_dir)
            .cache_size(config.block_cache_size)
            .open()?;

        let data = keyspace.open_partition(
            "data",
            PartitionCreateOptions::default()
                .block_size(64 * 1024)
                .compression(config.compression),
        )?;

        tracing::info!(path = %config.data_dir.display(), "opened transactional store");

        Ok(Self {
            inner: Arc::new(StoreInner {
                keyspace,
                data,
                persist_mode: config.persist_mode,
                state: Mutex::new(CommitState {
                    version: 0,
                    history: BTreeMap::new(),
                    live: BTreeMap::new(),
                }),
            }),
        })
    }

    /// Begin a new transaction pinned to the current committed version.
    pub fn begin(&self) -> Transaction {
        let mut state = self.inner.state.lock();
        let begin_version = state.version;
        *state.live.entry(begin_version).or_insert(0) += 1;
        drop(state);

        Transaction::new(self.inner.clone(), begin_version)
    }
}

impl StoreInner {
    /// Build the overlay of prior values needed to view `[begin, end)` as of
    /// `snapshot_version`. First history entry past the snapshot wins per
    /// key: it recorded the value the key had at snapshot time.
    pub(crate) fn snapshot_overlay(
        &self,
        snapshot_version: u64,
        begin: &[u8],
        end: &[u8],
    ) -> BTreeMap<Vec<u8>, PriorValue> {
        let state = self.state.lock();
        let mut overlay: BTreeMap<Vec<u8>, PriorValue> = BTreeMap::new();

        for ops in state.history.range(snapshot_version + 1..).map(|(_, v)| v) {
            for (key, prior) in ops {
                if key.as_slice() < begin {
                    continue;
                }
                if !end.is_empty() && key.as_slice() >= end {
                    continue;
                }
                if !overlay.contains_key(key) {
                    overlay.insert(key.clone(), prior.clone());
                }
            }
        }

        overlay
    }

    /// The value `key` had as of `snapshot_version`, if the history says it
    /// has changed since. `None` means the history is silent and the
    /// committed partition is authoritative.
    pub(crate) fn snapshot_prior(
        &self,
        snapshot_version: u64,
        key: &[u8],
    ) -> Option<PriorValue> {
        let state = self.state.lock();
        for ops in state.history.range(snapshot_version + 1..).map(|(_, v)| v) {
            for (k, prior) in ops {
                if k.as_slice() == key {
                    return Some(prior.clone());
                }
            }
        }
        None
    }

    /// Apply a transaction's buffered writes as one atomic batch.
    ///
    /// First-committer-wins: if any key in the write set was committed by
    /// another transaction after `begin_version`, the whole commit fails
    /// with [`Error::Conflict`] and nothing is applied.
    pub(crate) fn commit_writes(
        &self,
        begin_version: u64,
        writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    ) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();

        for ops in state.history.range(begin_version + 1..).map(|(_, v)| v) {
            for (key, _) in ops {
                if writes.contains_key(key) {
                    tracing::debug!(key = ?key, begin_version, "commit lost write-write race");
                    return Err(Error::Conflict { key: key.clone() });
                }
            }
        }

        let version = state.version + 1;
        let mut batch = self.keyspace.batch();
        let mut ops = Vec::with_capacity(writes.len());

        for (key, value) in writes {
            let prior = self.data.get(&key)?.map(|v| v.to_vec());
            match &value {
                Some(v) => batch.insert(&self.data, key.clone(), v.clone()),
                None => batch.remove(&self.data, key.clone()),
            }
            ops.push((key, prior));
        }

        batch.commit()?;
        self.keyspace.persist(self.persist_mode.clone())?;

        state.version = version;
        state.history.insert(version, ops);

        Ok(())
    }

    /// Drop a transaction's pin and prune history no live transaction can
    /// still reach.
    pub(crate) fn release(&self, begin_version: u64) {
        let mut state = self.state.lock();

        if let Some(count) = state.live.get_mut(&begin_version) {
            *count -= 1;
            if *count == 0 {
                state.live.remove(&begin_version);
            }
        }

        let keep_after = state.live.keys().next().copied().unwrap_or(state.version);
        state.history = state.history.split_off(&(keep_after + 1));
    }
}
