//! The group store engine
//!
//! `GroupStore` ties the pieces together: it registers group schemas and
//! indexes, computes HKeys (resolving parents through their primary-key
//! index trees), and opens cursors and windowed scans over the backing
//! transactional store. The DML surface (write/delete/update with
//! cascading relocation) lives in `write`.

use crate::config::StoreConfig;
use crate::cursor::GroupCursor;
use crate::encoding::{self, deserialize_row};
use crate::error::{Error, Result};
use crate::group::GroupSchema;
use crate::hkey::{HKey, HKeySegment, KeyValue};
use crate::index::{IndexDef, IndexSpec};
use crate::metrics::StoreMetrics;
use crate::types::Row;
use crate::types::schema::{Table, TableName};
use crate::types::value::Value;
use crate::window::{GroupScan, ScanOptions};
use crate::write::RowSources;
use grove_kv::{KvConfig, TransactStore, Transaction};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The engine: hierarchical group storage over an ordered transactional
/// key-value store.
pub struct GroupStore {
    kv: TransactStore,
    config: StoreConfig,
    metrics: Arc<StoreMetrics>,
    groups: RwLock<HashMap<String, Arc<GroupSchema>>>,
    indexes: RwLock<HashMap<String, Vec<Arc<IndexDef>>>>,
}

impl GroupStore {
    /// Open a store backed by a fresh [`TransactStore`] at the configured
    /// path.
    pub fn open(
        kv_config: KvConfig,
        config: StoreConfig,
        metrics: Arc<StoreMetrics>,
    ) -> Result<Self> {
        let kv = TransactStore::open(kv_config)?;
        Ok(Self::with_store(kv, config, metrics))
    }

    /// Wrap an already-open backing store.
    pub fn with_store(kv: TransactStore, config: StoreConfig, metrics: Arc<StoreMetrics>) -> Self {
        Self {
            kv,
            config,
            metrics,
            groups: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Begin a transaction on the backing store.
    pub fn begin(&self) -> Transaction {
        self.kv.begin()
    }

    pub fn metrics(&self) -> &Arc<StoreMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ========================================================================
    // Schema registration
    // ========================================================================

    /// Validate and register a group.
    pub fn create_group(&self, name: &str, tables: Vec<Table>) -> Result<Arc<GroupSchema>> {
        let group = Arc::new(GroupSchema::build(name, tables)?);

        let mut groups = self.groups.write();
        if groups.contains_key(name) {
            return Err(Error::InvalidSchema(format!("group {name} already exists")));
        }
        groups.insert(name.to_string(), group.clone());
        drop(groups);

        tracing::info!(
            group = name,
            tree = group.tree_name(),
            tables = group.table_count(),
            "registered group"
        );
        Ok(group)
    }

    pub fn group(&self, name: &str) -> Result<Arc<GroupSchema>> {
        self.groups
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::GroupNotFound(name.to_string()))
    }

    /// Register a secondary index and backfill it from the group's current
    /// contents within the caller's transaction.
    pub fn create_index(
        &self,
        txn: &mut Transaction,
        group_name: &str,
        spec: IndexSpec,
    ) -> Result<()> {
        let group = self.group(group_name)?;
        let def = Arc::new(IndexDef::build(&group, &spec)?);

        {
            let indexes = self.indexes.read();
            if indexes
                .get(group_name)
                .is_some_and(|defs| defs.iter().any(|d| d.name == def.name))
            {
                return Err(Error::InvalidSchema(format!(
                    "index {} already exists on group {group_name}",
                    def.name
                )));
            }
        }

        // Backfill from existing anchor rows.
        let anchor_ordinal = group.ordinal(def.anchor);
        let prefix = group.tree_prefix().to_vec();
        let upper = encoding::prefix_end(&prefix);
        let mut lower = prefix.clone();
        loop {
            let page = txn.get_range(&lower, &upper, self.config.scan_batch_size, false)?;
            let exhausted = page.len() < self.config.scan_batch_size;
            if let Some((last, _)) = page.last() {
                lower = encoding::key_after(last);
            }
            for (key, _) in &page {
                let hkey = HKey::decode(&group, &key[prefix.len()..])?;
                if hkey.ordinal() != Some(anchor_ordinal) {
                    continue;
                }
                if let Some(entry_values) =
                    self.branch_values(txn, &group, &def, &hkey, &RowSources::EMPTY)?
                {
                    if def.unique {
                        self.check_unique(txn, &def, &entry_values, &[&key[prefix.len()..]])?;
                    }
                    let entry = def.entry_key(&entry_values, &key[prefix.len()..])?;
                    txn.set(&entry, b"")?;
                }
            }
            if exhausted {
                break;
            }
        }

        self.indexes
            .write()
            .entry(group_name.to_string())
            .or_default()
            .push(def);
        Ok(())
    }

    pub(crate) fn index_defs(&self, group_name: &str) -> Vec<Arc<IndexDef>> {
        self.indexes
            .read()
            .get(group_name)
            .cloned()
            .unwrap_or_default()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Look up one row by primary key, through the table's PK index.
    pub fn get_row(
        &self,
        txn: &Transaction,
        group_name: &str,
        table: &TableName,
        key: &[Value],
    ) -> Result<Option<Row>> {
        let group = self.group(group_name)?;
        let position = group.table_index(table)?;

        let pk_key = self.pk_index_key(&group, position, key)?;
        let Some(hkey_bytes) = txn.get(&pk_key, false)? else {
            return Ok(None);
        };
        let hkey = HKey::decode(&group, &hkey_bytes)?;

        let row_key = self.row_key(&group, &hkey)?;
        let Some(payload) = txn.get(&row_key, false)? else {
            return Ok(None);
        };

        Ok(Some(Row {
            table: table.clone(),
            values: deserialize_row(&payload)?,
            hkey,
        }))
    }

    /// Read the rows a secondary index's entries point at, for an exact
    /// match on all of the index's column values. Orphaned branches carry
    /// no ancestor-qualified entries, so they never appear here.
    pub fn index_lookup(
        &self,
        txn: &Transaction,
        group_name: &str,
        index: &str,
        values: &[Value],
    ) -> Result<Vec<Row>> {
        let group = self.group(group_name)?;
        let def = self
            .index_defs(group_name)
            .into_iter()
            .find(|d| d.name == index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;
        if values.len() != def.columns.len() {
            return Err(Error::InvalidValue(format!(
                "index {} has {} columns, got {}",
                def.name,
                def.columns.len(),
                values.len()
            )));
        }

        let start = def.values_prefix(values)?;
        let end = encoding::prefix_end(&start);
        let mut rows = Vec::new();
        for (entry, _) in txn.get_range(&start, &end, 0, false)? {
            let hkey = HKey::decode(&group, &entry[start.len()..])?;
            let position = hkey
                .ordinal()
                .and_then(|ordinal| group.table_position(ordinal))
                .ok_or_else(|| Error::EncodingError {
                    offset: 0,
                    reason: "index entry without a table segment".into(),
                })?;

            let row_key = self.row_key(&group, &hkey)?;
            let Some(payload) = txn.get(&row_key, false)? else {
                return Err(Error::StructuralViolation(format!(
                    "index {} entry points at missing row {hkey}",
                    def.name
                )));
            };
            rows.push(Row {
                table: group.table(position).name.clone(),
                values: deserialize_row(&payload)?,
                hkey,
            });
        }
        Ok(rows)
    }

    /// Open a cursor over `[lower, upper)` inside the given transaction.
    /// The cursor reads the transaction's live view, so it observes that
    /// transaction's own uncommitted writes. `close()` hands the
    /// transaction back.
    pub fn open_cursor(
        &self,
        txn: Transaction,
        group_name: &str,
        lower: Option<&HKey>,
        upper: Option<&HKey>,
    ) -> Result<GroupCursor> {
        let group = self.group(group_name)?;
        let (lower, upper) = self.scan_bounds(&group, lower, upper)?;
        Ok(GroupCursor::open_at_keys(
            txn,
            group,
            lower,
            upper,
            self.config.scan_batch_size,
            false,
            self.metrics.clone(),
        ))
    }

    /// Open a windowed scan over `[lower, upper)`. The scan owns its
    /// backing sub-transactions and rotates them per the options' row and
    /// time limits.
    pub fn scan(
        &self,
        group_name: &str,
        lower: Option<&HKey>,
        upper: Option<&HKey>,
        options: ScanOptions,
    ) -> Result<GroupScan> {
        let group = self.group(group_name)?;
        let (lower, upper) = self.scan_bounds(&group, lower, upper)?;
        GroupScan::new(
            self.kv.clone(),
            group,
            lower,
            upper,
            options,
            self.config.scan_batch_size,
            self.metrics.clone(),
        )
    }

    /// Remove every entry of a group: its tree, its PK index trees, and
    /// its secondary index trees.
    pub fn truncate_group(&self, txn: &mut Transaction, group_name: &str) -> Result<()> {
        let group = self.group(group_name)?;

        let mut prefixes: Vec<Vec<u8>> = vec![group.tree_prefix().to_vec()];
        for position in 0..group.table_count() {
            prefixes.push(group.pk_tree_prefix(position).to_vec());
        }
        for def in self.index_defs(group_name) {
            prefixes.push(def.tree_prefix.clone());
        }

        for prefix in prefixes {
            let end = encoding::prefix_end(&prefix);
            txn.clear_range(&prefix, &end)?;
        }
        Ok(())
    }

    fn scan_bounds(
        &self,
        group: &GroupSchema,
        lower: Option<&HKey>,
        upper: Option<&HKey>,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let prefix = group.tree_prefix();
        let lower = match lower {
            Some(hkey) => self.row_key(group, hkey)?,
            None => prefix.to_vec(),
        };
        let upper = match upper {
            Some(hkey) => self.row_key(group, hkey)?,
            None => encoding::prefix_end(prefix),
        };
        Ok((lower, upper))
    }

    // ========================================================================
    // Key construction
    // ========================================================================

    pub(crate) fn row_key(&self, group: &GroupSchema, hkey: &HKey) -> Result<Vec<u8>> {
        let mut key = group.tree_prefix().to_vec();
        key.extend_from_slice(&hkey.encode()?);
        Ok(key)
    }

    pub(crate) fn pk_index_key(
        &self,
        group: &GroupSchema,
        position: usize,
        key_values: &[Value],
    ) -> Result<Vec<u8>> {
        let table = group.table(position);
        if key_values.len() != table.primary_key.len() {
            return Err(Error::InvalidValue(format!(
                "table {} has a {}-column key, got {}",
                table.name,
                table.primary_key.len(),
                key_values.len()
            )));
        }
        let mut key = group.pk_tree_prefix(position).to_vec();
        for value in key_values {
            encoding::encode_value(value, &mut key)?;
        }
        Ok(key)
    }

    pub(crate) fn pk_values(
        &self,
        group: &GroupSchema,
        position: usize,
        values: &[Value],
    ) -> Vec<Value> {
        group.table(position).primary_key
            .iter()
            .map(|&col| values[col].clone())
            .collect()
    }

    // ========================================================================
    // HKey computation
    // ========================================================================

    /// Compute a row's HKey from its own key columns and its ancestors'
    /// segments. The immediate parent is resolved through its PK index; a
    /// foreign key that resolves to no existing parent instance produces
    /// the reserved no-ancestor placeholder in every underivable ancestor
    /// position, which keeps the row deterministically ordered and
    /// scannable while excluding it from ancestor-qualified lookups.
    pub(crate) fn hkey_for_row(
        &self,
        txn: &Transaction,
        group: &GroupSchema,
        position: usize,
        values: &[Value],
    ) -> Result<HKey> {
        let own = group.segment_for(position, values);

        let Some(parent) = group.parent_of(position) else {
            return Ok(HKey::new(vec![own]));
        };

        let join = group
            .table(position)
            .parent_join
            .as_ref()
            .ok_or_else(|| Error::InvalidSchema("non-root table without parent join".into()))?;

        let fk: Vec<Value> = join
            .child_columns
            .iter()
            .map(|&col| values[col].clone())
            .collect();

        if fk.iter().all(|v| !v.is_null()) {
            let pk_key = self.pk_index_key(group, parent, &fk)?;
            if let Some(hkey_bytes) = txn.get(&pk_key, false)? {
                let parent_hkey = HKey::decode(group, &hkey_bytes)?;
                let mut segments = parent_hkey.segments;
                segments.push(own);
                return Ok(HKey::new(segments));
            }
        }

        // Orphan: derive what the foreign key pins down, fill the rest
        // with the no-ancestor marker.
        let parent_pk = &group.table(parent).primary_key;
        let mut known = HashMap::new();
        for (i, &col) in join.child_columns.iter().enumerate() {
            if !values[col].is_null() {
                known.insert(parent_pk[i], values[col].clone());
            }
        }
        let mut segments = orphan_segments(group, parent, &known);
        segments.push(own);
        Ok(HKey::new(segments))
    }
}

/// Ancestor segments for a row whose parent does not exist: segment values
/// the foreign key determines are kept, everything else becomes the
/// no-ancestor marker. `known` maps column indices of table `position` to
/// their pinned values.
fn orphan_segments(
    group: &GroupSchema,
    position: usize,
    known: &HashMap<usize, Value>,
) -> Vec<HKeySegment> {
    let segment = HKeySegment {
        ordinal: group.ordinal(position),
        values: group
            .segment_columns(position)
            .iter()
            .map(|col| {
                known
                    .get(col)
                    .cloned()
                    .map(KeyValue::Value)
                    .unwrap_or(KeyValue::NoAncestor)
            })
            .collect(),
    };

    let Some(parent) = group.parent_of(position) else {
        return vec![segment];
    };
    let Some(join) = group.table(position).parent_join.as_ref() else {
        return vec![segment];
    };

    let parent_pk = &group.table(parent).primary_key;
    let mut up = HashMap::new();
    for (i, &col) in join.child_columns.iter().enumerate() {
        if let Some(value) = known.get(&col) {
            up.insert(parent_pk[i], value.clone());
        }
    }

    let mut segments = orphan_segments(group, parent, &up);
    segments.push(segment);
    segments
}
