//! Transactions: buffered writes, merged reads

use crate::error::{Error, Result};
use crate::store::StoreInner;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// A transaction over the store's ordered key space.
///
/// Writes are buffered in memory and applied atomically at [`commit`].
/// Reads come in two flavors, selected per call:
/// - `snapshot = false`: latest committed state merged with this
///   transaction's own buffered writes (read-your-own-writes).
/// - `snapshot = true`: the committed state as of this transaction's begin
///   version, without its own writes; commits that land elsewhere during
///   the transaction stay invisible.
///
/// Dropping a transaction without committing discards its writes.
///
/// [`commit`]: Transaction::commit
pub struct Transaction {
    inner: Arc<StoreInner>,
    begin_version: u64,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    open: bool,
}

fn fjall_bounds(begin: &[u8], end: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let upper = if end.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Excluded(end.to_vec())
    };
    (Bound::Included(begin.to_vec()), upper)
}

impl Transaction {
    pub(crate) fn new(inner: Arc<StoreInner>, begin_version: u64) -> Self {
        Self {
            inner,
            begin_version,
            writes: BTreeMap::new(),
            open: true,
        }
    }

    /// The committed version this transaction's snapshot reads are pinned to.
    pub fn begin_version(&self) -> u64 {
        self.begin_version
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::TransactionClosed)
        }
    }

    /// Read one key.
    pub fn get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        if snapshot {
            if let Some(prior) = self.inner.snapshot_prior(self.begin_version, key) {
                return Ok(prior);
            }
        } else if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }

        Ok(self.inner.data.get(key)?.map(|v| v.to_vec()))
    }

    /// Read an ascending page of the half-open range `[begin, end)`.
    ///
    /// An empty `end` means unbounded above. `limit = 0` means no limit;
    /// otherwise at most `limit` pairs are returned, and a short page
    /// signals the range is exhausted.
    pub fn get_range(
        &self,
        begin: &[u8],
        end: &[u8],
        limit: usize,
        snapshot: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.ensure_open()?;

        let overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>> = if snapshot {
            self.inner.snapshot_overlay(self.begin_version, begin, end)
        } else {
            self.writes
                .range(fjall_bounds(begin, end))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        let mut out: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let full = |out: &Vec<(Vec<u8>, Vec<u8>)>| limit != 0 && out.len() >= limit;

        let mut overlay_iter = overlay.into_iter().peekable();

        for entry in self.inner.data.range(fjall_bounds(begin, end)) {
            let (k, v) = entry?;
            let key = k.to_vec();

            // Emit overlay keys that sort before the committed key.
            while let Some((ok, _)) = overlay_iter.peek() {
                if *ok >= key {
                    break;
                }
                let (ok, ov) = overlay_iter.next().expect("peeked");
                if let Some(val) = ov {
                    out.push((ok, val));
                    if full(&out) {
                        return Ok(out);
                    }
                }
            }

            // Overlay overrides the committed value for the same key.
            if overlay_iter.peek().is_some_and(|(ok, _)| *ok == key) {
                let (_, ov) = overlay_iter.next().expect("peeked");
                if let Some(val) = ov {
                    out.push((key, val));
                    if full(&out) {
                        return Ok(out);
                    }
                }
                continue;
            }

            out.push((key, v.to_vec()));
            if full(&out) {
                return Ok(out);
            }
        }

        for (ok, ov) in overlay_iter {
            if let Some(val) = ov {
                out.push((ok, val));
                if full(&out) {
                    return Ok(out);
                }
            }
        }

        Ok(out)
    }

    /// Buffer a write of `key = value`.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    /// Buffer a deletion of `key`.
    pub fn clear(&mut self, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    /// Buffer deletion of every key currently visible in `[begin, end)`,
    /// including this transaction's own buffered writes.
    pub fn clear_range(&mut self, begin: &[u8], end: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let visible = self.get_range(begin, end, 0, false)?;
        for (key, _) in visible {
            self.writes.insert(key, None);
        }
        Ok(())
    }

    /// Atomically apply this transaction's writes.
    ///
    /// Fails with [`Error::Conflict`] if another transaction committed to
    /// any key in the write set since this transaction began; the buffer is
    /// discarded either way, so a retry re-runs from original inputs.
    pub fn commit(mut self) -> Result<()> {
        self.ensure_open()?;
        self.open = false;
        let writes = std::mem::take(&mut self.writes);
        let result = self.inner.commit_writes(self.begin_version, writes);
        self.inner.release(self.begin_version);
        result
    }

    /// Discard this transaction's writes and release its snapshot pin.
    pub fn rollback(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.writes.clear();
            self.inner.release(self.begin_version);
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, KvConfig, TransactStore};

    fn store() -> TransactStore {
        TransactStore::open(KvConfig::for_testing()).unwrap()
    }

    #[test]
    fn read_your_own_writes() {
        let store = store();
        let mut txn = store.begin();
        txn.set(b"a", b"1").unwrap();

        assert_eq!(txn.get(b"a", false).unwrap(), Some(b"1".to_vec()));

        // Another transaction can't see the uncommitted write.
        let other = store.begin();
        assert_eq!(other.get(b"a", false).unwrap(), None);

        txn.commit().unwrap();
        let after = store.begin();
        assert_eq!(after.get(b"a", false).unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn snapshot_reads_ignore_later_commits() {
        let store = store();
        let mut setup = store.begin();
        setup.set(b"k1", b"old").unwrap();
        setup.set(b"k2", b"keep").unwrap();
        setup.commit().unwrap();

        let reader = store.begin();

        let mut writer = store.begin();
        writer.set(b"k1", b"new").unwrap();
        writer.set(b"k3", b"added").unwrap();
        writer.clear(b"k2").unwrap();
        writer.commit().unwrap();

        // Snapshot view is as of the reader's begin.
        assert_eq!(reader.get(b"k1", true).unwrap(), Some(b"old".to_vec()));
        assert_eq!(reader.get(b"k2", true).unwrap(), Some(b"keep".to_vec()));
        assert_eq!(reader.get(b"k3", true).unwrap(), None);

        let range = reader.get_range(b"", b"", 0, true).unwrap();
        assert_eq!(
            range,
            vec![
                (b"k1".to_vec(), b"old".to_vec()),
                (b"k2".to_vec(), b"keep".to_vec()),
            ]
        );

        // Non-snapshot reads see the latest committed state.
        assert_eq!(reader.get(b"k1", false).unwrap(), Some(b"new".to_vec()));
        assert_eq!(reader.get(b"k2", false).unwrap(), None);
    }

    #[test]
    fn write_write_conflict_is_retryable() {
        let store = store();
        let mut setup = store.begin();
        setup.set(b"counter", b"0").unwrap();
        setup.commit().unwrap();

        let mut t1 = store.begin();
        let mut t2 = store.begin();
        t1.set(b"counter", b"1").unwrap();
        t2.set(b"counter", b"2").unwrap();

        t1.commit().unwrap();
        let err = t2.commit().unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, Error::Conflict { .. }));

        // Retry from original inputs succeeds.
        let mut t3 = store.begin();
        t3.set(b"counter", b"2").unwrap();
        t3.commit().unwrap();

        let check = store.begin();
        assert_eq!(check.get(b"counter", false).unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn disjoint_writes_do_not_conflict() {
        let store = store();
        let mut t1 = store.begin();
        let mut t2 = store.begin();
        t1.set(b"a", b"1").unwrap();
        t2.set(b"b", b"2").unwrap();
        t1.commit().unwrap();
        t2.commit().unwrap();
    }

    #[test]
    fn range_paging_with_limit() {
        let store = store();
        let mut setup = store.begin();
        for i in 0u8..10 {
            setup.set(&[b'k', i], &[i]).unwrap();
        }
        setup.commit().unwrap();

        let txn = store.begin();
        let page = txn.get_range(b"k", b"l", 4, false).unwrap();
        assert_eq!(page.len(), 4);
        assert_eq!(page[0].0, vec![b'k', 0]);

        // Resume from the successor of the last key.
        let mut lower = page.last().unwrap().0.clone();
        lower.push(0x00);
        let rest = txn.get_range(&lower, b"l", 0, false).unwrap();
        assert_eq!(rest.len(), 6);
        assert_eq!(rest[0].0, vec![b'k', 4]);
    }

    #[test]
    fn merged_range_sees_buffered_writes_in_order() {
        let store = store();
        let mut setup = store.begin();
        setup.set(b"b", b"committed").unwrap();
        setup.set(b"d", b"committed").unwrap();
        setup.commit().unwrap();

        let mut txn = store.begin();
        txn.set(b"a", b"buffered").unwrap();
        txn.set(b"c", b"buffered").unwrap();
        txn.clear(b"d").unwrap();

        let keys: Vec<Vec<u8>> = txn
            .get_range(b"", b"", 0, false)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn clear_range_covers_buffered_and_committed_keys() {
        let store = store();
        let mut setup = store.begin();
        setup.set(b"p1", b"x").unwrap();
        setup.set(b"p2", b"x").unwrap();
        setup.set(b"q1", b"x").unwrap();
        setup.commit().unwrap();

        let mut txn = store.begin();
        txn.set(b"p3", b"x").unwrap();
        txn.clear_range(b"p", b"q").unwrap();
        txn.commit().unwrap();

        let check = store.begin();
        let keys: Vec<Vec<u8>> = check
            .get_range(b"", b"", 0, false)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"q1".to_vec()]);
    }

    #[test]
    fn rollback_discards_writes() {
        let store = store();
        let mut txn = store.begin();
        txn.set(b"a", b"1").unwrap();
        txn.rollback();

        let check = store.begin();
        assert_eq!(check.get(b"a", false).unwrap(), None);
    }
}
