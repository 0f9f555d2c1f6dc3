//! Group model
//!
//! A group is the tree of tables connected by parent joins, rooted at the
//! table with no parent join. Building a group validates the join graph and
//! precomputes everything HKey construction and decoding need: stable
//! ordinals, ancestor paths, and each table's own segment columns (its
//! primary key minus the columns inherited through the parent join).

use crate::encoding;
use crate::error::{Error, Result};
use crate::hkey::{HKeySegment, KeyValue};
use crate::naming;
use crate::types::schema::{Table, TableName};
use crate::types::value::Value;
use std::collections::HashMap;

/// Static metadata for one group: its member tables and the physical tree
/// they share.
#[derive(Debug)]
pub struct GroupSchema {
    name: String,
    tree_name: String,
    tree_prefix: Vec<u8>,
    tables: Vec<Table>,
    by_name: HashMap<TableName, usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    /// Root-to-self table positions, per table.
    path: Vec<Vec<usize>>,
    /// Key columns each table contributes to its own HKey segment.
    segment_columns: Vec<Vec<usize>>,
    pk_tree_names: Vec<String>,
    pk_tree_prefixes: Vec<Vec<u8>>,
    root: usize,
}

impl GroupSchema {
    /// Validate the table tree and build the group.
    pub fn build(name: &str, tables: Vec<Table>) -> Result<GroupSchema> {
        if name.is_empty() {
            return Err(Error::InvalidSchema("group name cannot be empty".into()));
        }
        if tables.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "group {name} must have at least one table"
            )));
        }
        if tables.len() > u16::MAX as usize {
            return Err(Error::InvalidSchema(format!(
                "group {name} has too many tables"
            )));
        }

        let mut by_name = HashMap::new();
        for (i, table) in tables.iter().enumerate() {
            if by_name.insert(table.name.clone(), i).is_some() {
                return Err(Error::InvalidSchema(format!(
                    "duplicate table {} in group {name}",
                    table.name
                )));
            }
        }

        let roots: Vec<usize> = tables
            .iter()
            .enumerate()
            .filter(|(_, t)| t.parent_join.is_none())
            .map(|(i, _)| i)
            .collect();
        let root = match roots.as_slice() {
            [root] => *root,
            [] => {
                return Err(Error::InvalidSchema(format!(
                    "group {name} has no root table"
                )));
            }
            _ => {
                return Err(Error::InvalidSchema(format!(
                    "group {name} has more than one root table"
                )));
            }
        };

        // Resolve and validate joins, building the adjacency.
        let mut parent = vec![None; tables.len()];
        let mut children = vec![Vec::new(); tables.len()];
        for (i, table) in tables.iter().enumerate() {
            let Some(join) = &table.parent_join else {
                continue;
            };
            let p = *by_name.get(&join.parent).ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "table {} joins unknown parent {}",
                    table.name, join.parent
                ))
            })?;
            let parent_table = &tables[p];

            if join.child_columns.len() != join.parent_columns.len() {
                return Err(Error::InvalidSchema(format!(
                    "parent join of {} has mismatched column counts",
                    table.name
                )));
            }

            let resolved: Vec<usize> = join
                .parent_columns
                .iter()
                .map(|col| {
                    parent_table.get_column(col).map(|(idx, _)| idx).ok_or_else(|| {
                        Error::InvalidSchema(format!(
                            "parent join of {} names unknown column {} in {}",
                            table.name, col, parent_table.name
                        ))
                    })
                })
                .collect::<Result<_>>()?;
            if resolved != parent_table.primary_key {
                return Err(Error::InvalidSchema(format!(
                    "parent join of {} must match the primary key of {}",
                    table.name, parent_table.name
                )));
            }

            for (&child_col, &parent_col) in join.child_columns.iter().zip(resolved.iter()) {
                let child_type = &table.columns[child_col].datatype;
                let parent_type = &parent_table.columns[parent_col].datatype;
                if child_type != parent_type {
                    return Err(Error::InvalidSchema(format!(
                        "join column {} of {} has type {}, parent expects {}",
                        table.columns[child_col].name, table.name, child_type, parent_type
                    )));
                }
            }

            parent[i] = Some(p);
            children[p].push(i);
        }

        // Every table must hang off the root; anything unreachable means a
        // cycle or a disconnected branch.
        let mut path: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
        let mut visited = 0usize;
        let mut queue = std::collections::VecDeque::from([root]);
        path[root] = vec![root];
        while let Some(t) = queue.pop_front() {
            visited += 1;
            for &c in &children[t] {
                let mut p = path[t].clone();
                p.push(c);
                path[c] = p;
                queue.push_back(c);
            }
        }
        if visited != tables.len() {
            return Err(Error::InvalidSchema(format!(
                "group {name} has tables not reachable from its root"
            )));
        }

        let segment_columns: Vec<Vec<usize>> = tables
            .iter()
            .map(|table| {
                let inherited: &[usize] = table
                    .parent_join
                    .as_ref()
                    .map(|j| j.child_columns.as_slice())
                    .unwrap_or(&[]);
                table
                    .primary_key
                    .iter()
                    .copied()
                    .filter(|col| !inherited.contains(col))
                    .collect()
            })
            .collect();

        let schema = &tables[root].name.schema;
        let tree_name = naming::generate_group_tree_name(schema, name);
        let tree_prefix = encoding::tree_prefix(&tree_name);
        let pk_tree_names: Vec<String> = tables
            .iter()
            .map(|t| naming::generate_index_tree_name(&t.name.schema, &t.name.name, "pk"))
            .collect();
        let pk_tree_prefixes = pk_tree_names
            .iter()
            .map(|n| encoding::tree_prefix(n))
            .collect();

        Ok(GroupSchema {
            name: name.to_string(),
            tree_name,
            tree_prefix,
            tables,
            by_name,
            parent,
            children,
            path,
            segment_columns,
            pk_tree_names,
            pk_tree_prefixes,
            root,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The physical tree name backing this group's key region.
    pub fn tree_name(&self) -> &str {
        &self.tree_name
    }

    pub(crate) fn tree_prefix(&self) -> &[u8] {
        &self.tree_prefix
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, position: usize) -> &Table {
        &self.tables[position]
    }

    pub fn table_index(&self, name: &TableName) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn parent_of(&self, position: usize) -> Option<usize> {
        self.parent[position]
    }

    pub fn children_of(&self, position: usize) -> &[usize] {
        &self.children[position]
    }

    /// Root-to-self positions for a table.
    pub fn path_of(&self, position: usize) -> &[usize] {
        &self.path[position]
    }

    /// Stable ordinal embedded in HKey segments. Never zero.
    pub fn ordinal(&self, position: usize) -> u16 {
        position as u16 + 1
    }

    /// Inverse of [`ordinal`](GroupSchema::ordinal).
    pub fn table_position(&self, ordinal: u16) -> Option<usize> {
        let ordinal = ordinal as usize;
        if ordinal >= 1 && ordinal <= self.tables.len() {
            Some(ordinal - 1)
        } else {
            None
        }
    }

    /// Number of key values a table contributes to its own segment.
    pub fn segment_width(&self, position: usize) -> usize {
        self.segment_columns[position].len()
    }

    pub fn segment_columns(&self, position: usize) -> &[usize] {
        &self.segment_columns[position]
    }

    pub(crate) fn pk_tree_prefix(&self, position: usize) -> &[u8] {
        &self.pk_tree_prefixes[position]
    }

    pub fn pk_tree_name(&self, position: usize) -> &str {
        &self.pk_tree_names[position]
    }

    /// The segment a row of this table contributes to its own HKey.
    pub(crate) fn segment_for(&self, position: usize, values: &[Value]) -> HKeySegment {
        HKeySegment {
            ordinal: self.ordinal(position),
            values: self.segment_columns[position]
                .iter()
                .map(|&col| KeyValue::Value(values[col].clone()))
                .collect(),
        }
    }
}
