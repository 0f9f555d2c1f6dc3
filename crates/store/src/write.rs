//! Row writes and the update propagator
//!
//! All mutation follows the same discipline: validate and compute against
//! the pre-mutation tree first, then apply. A structural update (any
//! key-contributing column changed) deletes the row at its old HKey,
//! inserts it at the new one, and relocates every descendant by splicing
//! the new ancestor segments onto its retained tail, re-keying each
//! descendant's entry and index entries. Descendant field values are never
//! touched; only their ancestor segments shift.
//!
//! The caller wraps each operation in one backing transaction, so a
//! partially applied relocation is never observable outside it.

use crate::encoding::{self, deserialize_row, serialize_row};
use crate::engine::GroupStore;
use crate::error::{Error, Result};
use crate::group::GroupSchema;
use crate::hkey::HKey;
use crate::index::IndexDef;
use crate::types::Row;
use crate::types::schema::TableName;
use crate::types::value::Value;
use grove_kv::Transaction;
use std::collections::BTreeMap;

/// Where to resolve row payloads while computing index entries.
///
/// Entries are planned against a tree that is about to change, so
/// resolution consults, in order: the one row whose values are in flight,
/// a captured subtree keyed by pre-move row keys, and finally the store.
pub(crate) struct RowSources<'a> {
    /// Captured subtree payloads plus the key translation between the
    /// coordinate space being resolved and the captured (old) space:
    /// `(payloads by old key, old base key, resolved-space base key)`.
    pub overlay: Option<(&'a BTreeMap<Vec<u8>, Vec<u8>>, &'a [u8], &'a [u8])>,
    /// `(row key in the resolved space, field values)` for the updated row.
    pub updated: Option<(&'a [u8], &'a [Value])>,
}

impl RowSources<'_> {
    pub(crate) const EMPTY: RowSources<'static> = RowSources {
        overlay: None,
        updated: None,
    };
}

fn format_key(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(","))
}

impl GroupStore {
    /// Write a new row, its primary-key index entry, and its secondary
    /// index entries. Fails with `DuplicateKey` before touching anything
    /// if the primary key is taken.
    pub fn write_row(
        &self,
        txn: &mut Transaction,
        group_name: &str,
        table: &TableName,
        values: Vec<Value>,
    ) -> Result<Row> {
        let group = self.group(group_name)?;
        let position = group.table_index(table)?;
        group.table(position).validate_row(&values)?;

        let hkey = self.hkey_for_row(txn, &group, position, &values)?;
        let hkey_bytes = hkey.encode()?;
        let row_key = self.row_key(&group, &hkey)?;

        let pk = self.pk_values(&group, position, &values);
        let pk_key = self.pk_index_key(&group, position, &pk)?;
        if txn.get(&pk_key, false)?.is_some() {
            return Err(Error::DuplicateKey {
                table: table.to_string(),
                key: format_key(&pk),
            });
        }

        let mut entries = Vec::new();
        for def in self.index_defs(group_name) {
            if def.anchor != position {
                continue;
            }
            let sources = RowSources {
                overlay: None,
                updated: Some((&row_key, &values)),
            };
            if let Some(entry_values) = self.branch_values(txn, &group, &def, &hkey, &sources)? {
                if def.unique {
                    self.check_unique(txn, &def, &entry_values, &[&hkey_bytes])?;
                }
                entries.push(def.entry_key(&entry_values, &hkey_bytes)?);
            }
        }

        txn.set(&row_key, &serialize_row(&values)?)?;
        txn.set(&pk_key, &hkey_bytes)?;
        for entry in entries {
            txn.set(&entry, b"")?;
        }

        self.metrics().row_written();
        Ok(Row {
            table: table.clone(),
            values,
            hkey,
        })
    }

    /// Delete a row and its index entries. Descendants stay in place; any
    /// group-index entries whose branch ran through the deleted row are
    /// removed, since their branch no longer resolves.
    pub fn delete_row(
        &self,
        txn: &mut Transaction,
        group_name: &str,
        table: &TableName,
        values: &[Value],
    ) -> Result<()> {
        let group = self.group(group_name)?;
        let position = group.table_index(table)?;
        group.table(position).validate_row(values)?;

        let hkey = self.hkey_for_row(txn, &group, position, values)?;
        let hkey_bytes = hkey.encode()?;
        let row_key = self.row_key(&group, &hkey)?;

        let Some(payload) = txn.get(&row_key, false)? else {
            return Err(Error::NotFound(table.to_string()));
        };
        let stored = deserialize_row(&payload)?;

        let defs = self.index_defs(group_name);
        let prefix_len = group.tree_prefix().len();
        let mut removals = Vec::new();

        for def in defs.iter().filter(|d| d.anchor == position) {
            let sources = RowSources {
                overlay: None,
                updated: Some((&row_key, &stored)),
            };
            if let Some(entry_values) = self.branch_values(txn, &group, def, &hkey, &sources)? {
                removals.push(def.entry_key(&entry_values, &hkey_bytes)?);
            }
        }

        // Only indexes whose branch runs through the deleted row lose
        // entries: the anchor lies below it and some indexed column sits at
        // the deleted level or above. An index reading columns strictly
        // below keeps its entries; those rows still exist.
        let below: Vec<_> = defs
            .iter()
            .filter(|d| {
                d.anchor != position
                    && group.path_of(d.anchor).contains(&position)
                    && d.columns
                        .iter()
                        .any(|&(t, _)| group.path_of(position).contains(&t))
            })
            .collect();
        if !below.is_empty() {
            let lower = encoding::key_after(&row_key);
            let upper = encoding::prefix_end(&row_key);
            for (key, value) in txn.get_range(&lower, &upper, 0, false)? {
                let descendant_hkey = HKey::decode(&group, &key[prefix_len..])?;
                for def in &below {
                    if descendant_hkey.ordinal() != Some(group.ordinal(def.anchor)) {
                        continue;
                    }
                    let descendant_values = deserialize_row(&value)?;
                    let sources = RowSources {
                        overlay: None,
                        updated: Some((&key, &descendant_values)),
                    };
                    if let Some(entry_values) =
                        self.branch_values(txn, &group, def, &descendant_hkey, &sources)?
                    {
                        removals.push(def.entry_key(&entry_values, &key[prefix_len..])?);
                    }
                }
            }
        }

        txn.clear(&row_key)?;
        let pk = self.pk_values(&group, position, &stored);
        txn.clear(&self.pk_index_key(&group, position, &pk)?)?;
        for removal in removals {
            txn.clear(&removal)?;
        }

        self.metrics().row_deleted();
        Ok(())
    }

    /// Apply an update. The effective row takes `new_values` for selected
    /// columns and the stored row's values elsewhere; no selector means a
    /// full replace.
    ///
    /// If no key-contributing column changed, the value is rewritten in
    /// place. Otherwise the row is relocated to its new HKey and every
    /// descendant follows it, so no row remains indexed under a stale
    /// ancestor segment.
    pub fn update_row(
        &self,
        txn: &mut Transaction,
        group_name: &str,
        table: &TableName,
        old_values: &[Value],
        new_values: &[Value],
        selector: Option<&[usize]>,
    ) -> Result<Row> {
        let group = self.group(group_name)?;
        let position = group.table_index(table)?;
        let tbl = group.table(position);
        tbl.validate_row(old_values)?;
        if new_values.len() != tbl.columns.len() {
            return Err(Error::InvalidValue(format!(
                "row has {} columns, table {} has {}",
                new_values.len(),
                tbl.name,
                tbl.columns.len()
            )));
        }

        let old_hkey = self.hkey_for_row(txn, &group, position, old_values)?;
        let old_hkey_bytes = old_hkey.encode()?;
        let old_key = self.row_key(&group, &old_hkey)?;
        let Some(payload) = txn.get(&old_key, false)? else {
            return Err(Error::NotFound(table.to_string()));
        };
        let stored = deserialize_row(&payload)?;

        let effective: Vec<Value> = match selector {
            None => new_values.to_vec(),
            Some(columns) => {
                for &col in columns {
                    if col >= tbl.columns.len() {
                        return Err(Error::InvalidValue(format!(
                            "column selector index {col} out of range for table {}",
                            tbl.name
                        )));
                    }
                }
                stored
                    .iter()
                    .enumerate()
                    .map(|(i, old)| {
                        if columns.contains(&i) {
                            new_values[i].clone()
                        } else {
                            old.clone()
                        }
                    })
                    .collect()
            }
        };
        tbl.validate_row(&effective)?;

        let new_hkey = self.hkey_for_row(txn, &group, position, &effective)?;
        let new_hkey_bytes = new_hkey.encode()?;
        let structural = new_hkey_bytes != old_hkey_bytes;
        let new_key = self.row_key(&group, &new_hkey)?;

        let old_pk = self.pk_values(&group, position, &stored);
        let new_pk = self.pk_values(&group, position, &effective);
        let pk_changed = old_pk != new_pk;

        // Validate first, mutate second.
        if structural && txn.get(&new_key, false)?.is_some() {
            return Err(Error::DuplicateKey {
                table: table.to_string(),
                key: new_hkey.to_string(),
            });
        }
        if pk_changed && txn.get(&self.pk_index_key(&group, position, &new_pk)?, false)?.is_some() {
            return Err(Error::DuplicateKey {
                table: table.to_string(),
                key: format_key(&new_pk),
            });
        }

        let defs = self.index_defs(group_name);
        let changed: Vec<usize> = (0..stored.len())
            .filter(|&i| stored[i] != effective[i])
            .collect();
        let touches = |def: &IndexDef| {
            def.columns
                .iter()
                .any(|&(t, col)| t == position && changed.contains(&col))
        };

        // Capture the subtree below the row whenever its rows' entries can
        // be affected: always for relocation, and for in-place updates
        // that change a column some deeper-anchored index carries.
        let needs_subtree = structural
            || defs.iter().any(|def| {
                def.anchor != position
                    && group.path_of(def.anchor).contains(&position)
                    && touches(def)
            });
        let mut subtree: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        if needs_subtree {
            let lower = encoding::key_after(&old_key);
            let upper = encoding::prefix_end(&old_key);
            for (key, value) in txn.get_range(&lower, &upper, 0, false)? {
                subtree.insert(key, value);
            }
        }

        // Plan index maintenance against the pre-mutation tree.
        let prefix_len = group.tree_prefix().len();
        let mut removes: Vec<Vec<u8>> = Vec::new();
        let mut inserts: Vec<Vec<u8>> = Vec::new();

        for def in &defs {
            let anchored_here = def.anchor == position;
            let anchored_below =
                def.anchor != position && group.path_of(def.anchor).contains(&position);
            if !(anchored_here && (structural || touches(def)))
                && !(anchored_below && (structural || touches(def)))
            {
                continue;
            }

            let old_sources = RowSources {
                overlay: Some((&subtree, &old_key, &old_key)),
                updated: Some((&old_key, &stored)),
            };
            let new_sources = RowSources {
                overlay: Some((&subtree, &old_key, &new_key)),
                updated: Some((&new_key, &effective)),
            };

            if anchored_here {
                if let Some(vals) = self.branch_values(txn, &group, def, &old_hkey, &old_sources)? {
                    removes.push(def.entry_key(&vals, &old_hkey_bytes)?);
                }
                if let Some(vals) = self.branch_values(txn, &group, def, &new_hkey, &new_sources)? {
                    if def.unique {
                        self.check_unique(txn, def, &vals, &[&old_hkey_bytes])?;
                    }
                    inserts.push(def.entry_key(&vals, &new_hkey_bytes)?);
                }
            } else {
                for (key, _) in &subtree {
                    let old_bytes = &key[prefix_len..];
                    let descendant_old = HKey::decode(&group, old_bytes)?;
                    if descendant_old.ordinal() != Some(group.ordinal(def.anchor)) {
                        continue;
                    }
                    if let Some(vals) =
                        self.branch_values(txn, &group, def, &descendant_old, &old_sources)?
                    {
                        removes.push(def.entry_key(&vals, old_bytes)?);
                    }
                    let descendant_new = if structural {
                        descendant_old.rebase(old_hkey.depth(), &new_hkey)
                    } else {
                        descendant_old.clone()
                    };
                    if let Some(vals) =
                        self.branch_values(txn, &group, def, &descendant_new, &new_sources)?
                    {
                        inserts.push(def.entry_key(&vals, &descendant_new.encode()?)?);
                    }
                }
            }
        }

        // Mutate.
        if structural {
            txn.clear(&old_key)?;
            txn.set(&new_key, &serialize_row(&effective)?)?;

            if pk_changed {
                txn.clear(&self.pk_index_key(&group, position, &old_pk)?)?;
            }
            txn.set(&self.pk_index_key(&group, position, &new_pk)?, &new_hkey_bytes)?;

            for (key, value) in &subtree {
                let suffix = &key[old_key.len()..];
                let mut relocated = new_key.clone();
                relocated.extend_from_slice(suffix);

                txn.clear(key)?;
                txn.set(&relocated, value)?;

                let descendant_hkey = HKey::decode(&group, &relocated[prefix_len..])?;
                let descendant_position = group
                    .table_position(descendant_hkey.ordinal().unwrap_or(0))
                    .ok_or_else(|| Error::EncodingError {
                        offset: 0,
                        reason: "descendant hkey without table".into(),
                    })?;
                let descendant_values = deserialize_row(value)?;
                let descendant_pk =
                    self.pk_values(&group, descendant_position, &descendant_values);
                txn.set(
                    &self.pk_index_key(&group, descendant_position, &descendant_pk)?,
                    &relocated[prefix_len..],
                )?;
            }

            tracing::debug!(
                table = %table,
                old = %old_hkey,
                new = %new_hkey,
                descendants = subtree.len(),
                "relocated row"
            );
            self.metrics().rows_relocated(subtree.len() as u64 + 1);
        } else {
            txn.set(&old_key, &serialize_row(&effective)?)?;
        }

        for remove in removes {
            txn.clear(&remove)?;
        }
        for insert in inserts {
            txn.set(&insert, b"")?;
        }

        self.metrics().row_updated();
        Ok(Row {
            table: table.clone(),
            values: effective,
            hkey: new_hkey,
        })
    }

    // ========================================================================
    // Index helpers
    // ========================================================================

    /// Resolve an index's column values along an anchor row's branch.
    /// Returns `None` when any contributing ancestor row is missing (an
    /// orphaned branch contributes no ancestor-qualified entries).
    pub(crate) fn branch_values(
        &self,
        txn: &Transaction,
        group: &GroupSchema,
        def: &IndexDef,
        anchor_hkey: &HKey,
        sources: &RowSources<'_>,
    ) -> Result<Option<Vec<Value>>> {
        let path = group.path_of(def.anchor);
        let mut out = Vec::with_capacity(def.columns.len());
        let mut cache: BTreeMap<usize, Vec<Value>> = BTreeMap::new();

        for &(table, col) in &def.columns {
            if let Some(values) = cache.get(&table) {
                out.push(values[col].clone());
                continue;
            }

            let depth = path
                .iter()
                .position(|&t| t == table)
                .expect("index columns validated against the anchor branch")
                + 1;
            let key = self.row_key(group, &anchor_hkey.ancestor(depth))?;

            let values = self.resolve_row(txn, &key, sources)?;
            let Some(values) = values else {
                return Ok(None);
            };
            out.push(values[col].clone());
            cache.insert(table, values);
        }

        Ok(Some(out))
    }

    fn resolve_row(
        &self,
        txn: &Transaction,
        key: &[u8],
        sources: &RowSources<'_>,
    ) -> Result<Option<Vec<Value>>> {
        if let Some((updated_key, values)) = sources.updated {
            if updated_key == key {
                return Ok(Some(values.to_vec()));
            }
        }
        if let Some((overlay, old_base, resolved_base)) = sources.overlay {
            if key.starts_with(resolved_base) {
                let mut old_key = old_base.to_vec();
                old_key.extend_from_slice(&key[resolved_base.len()..]);
                if let Some(payload) = overlay.get(&old_key) {
                    return Ok(Some(deserialize_row(payload)?));
                }
            }
        }
        match txn.get(key, false)? {
            Some(payload) => Ok(Some(deserialize_row(&payload)?)),
            None => Ok(None),
        }
    }

    /// Probe a unique index for a conflicting entry. NULLs never violate
    /// uniqueness; entries whose HKey suffix is in `exclude` are the
    /// caller's own.
    pub(crate) fn check_unique(
        &self,
        txn: &Transaction,
        def: &IndexDef,
        values: &[Value],
        exclude: &[&[u8]],
    ) -> Result<()> {
        if values.iter().any(|v| v.is_null()) {
            return Ok(());
        }

        let start = def.values_prefix(values)?;
        let end = encoding::prefix_end(&start);
        for (key, _) in txn.get_range(&start, &end, 0, false)? {
            let suffix = &key[start.len()..];
            if !exclude.iter().any(|h| *h == suffix) {
                return Err(Error::StructuralViolation(format!(
                    "unique index {} already contains {}",
                    def.name,
                    format_key(values)
                )));
            }
        }
        Ok(())
    }
}
