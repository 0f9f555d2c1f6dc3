//! Shared fixtures for group store integration tests
#![allow(dead_code)]

use grove_kv::KvConfig;
use grove_store::{
    Column, DataType, GroupScan, GroupStore, Row, ScanMode, ScanOptions, StoreConfig, StoreMetrics,
    Table, TableName, Value,
};
use std::sync::Arc;

pub const GROUP: &str = "retail";

pub fn customers() -> TableName {
    TableName::new("test", "customers")
}

pub fn orders() -> TableName {
    TableName::new("test", "orders")
}

pub fn items() -> TableName {
    TableName::new("test", "items")
}

/// A store with the customers -> orders -> items group registered.
pub fn open_store() -> GroupStore {
    let store = GroupStore::open(
        KvConfig::for_testing(),
        StoreConfig::for_testing(),
        Arc::new(StoreMetrics::new()),
    )
    .unwrap();

    let customers_table = Table::new(
        customers(),
        vec![
            Column::new("cid", DataType::Int),
            Column::new("name", DataType::Str),
        ],
        &["cid"],
    )
    .unwrap();
    let orders_table = Table::new(
        orders(),
        vec![
            Column::new("oid", DataType::Int),
            Column::new("cid", DataType::Int),
        ],
        &["oid"],
    )
    .unwrap()
    .with_parent(customers(), &[("cid", "cid")])
    .unwrap();
    let items_table = Table::new(
        items(),
        vec![
            Column::new("iid", DataType::Int),
            Column::new("oid", DataType::Int),
            Column::new("sku", DataType::Str),
        ],
        &["iid"],
    )
    .unwrap()
    .with_parent(orders(), &[("oid", "oid")])
    .unwrap();

    store
        .create_group(GROUP, vec![customers_table, orders_table, items_table])
        .unwrap();
    store
}

/// The standard nesting fixture: customers {1,2,3}, three orders each
/// (customer 1 owns orders 11..13), three items per order (order 11 owns
/// items 111..113).
pub fn populate_nested(store: &GroupStore) {
    let mut txn = store.begin();
    for cid in 1..=3i64 {
        store
            .write_row(
                &mut txn,
                GROUP,
                &customers(),
                vec![Value::Int(cid), Value::string(format!("customer-{cid}"))],
            )
            .unwrap();
        for o in 1..=3i64 {
            let oid = cid * 10 + o;
            store
                .write_row(
                    &mut txn,
                    GROUP,
                    &orders(),
                    vec![Value::Int(oid), Value::Int(cid)],
                )
                .unwrap();
            for i in 1..=3i64 {
                let iid = oid * 10 + i;
                store
                    .write_row(
                        &mut txn,
                        GROUP,
                        &items(),
                        vec![
                            Value::Int(iid),
                            Value::Int(oid),
                            Value::string(format!("sku-{iid}")),
                        ],
                    )
                    .unwrap();
            }
        }
    }
    txn.commit().unwrap();
}

/// Labels of the nested fixture's full scan, in depth-first pre-order.
pub fn expected_nested_labels() -> Vec<(String, i64)> {
    let mut expected = Vec::new();
    for cid in 1..=3i64 {
        expected.push(("customers".to_string(), cid));
        for o in 1..=3i64 {
            let oid = cid * 10 + o;
            expected.push(("orders".to_string(), oid));
            for i in 1..=3i64 {
                expected.push(("items".to_string(), oid * 10 + i));
            }
        }
    }
    expected
}

/// A wide two-level fixture: `customer_count` customers with
/// `orders_per_customer` orders each.
pub fn populate_flat(store: &GroupStore, customer_count: i64, orders_per_customer: i64) {
    let mut txn = store.begin();
    for cid in 1..=customer_count {
        store
            .write_row(
                &mut txn,
                GROUP,
                &customers(),
                vec![Value::Int(cid), Value::string(format!("customer-{cid}"))],
            )
            .unwrap();
        for o in 1..=orders_per_customer {
            store
                .write_row(
                    &mut txn,
                    GROUP,
                    &orders(),
                    vec![Value::Int(cid * 100 + o), Value::Int(cid)],
                )
                .unwrap();
        }
    }
    txn.commit().unwrap();
}

pub fn drain(mut scan: GroupScan) -> Vec<Row> {
    let mut rows = Vec::new();
    while let Some(row) = scan.next().unwrap() {
        rows.push(row);
    }
    rows
}

pub fn full_scan(store: &GroupStore) -> Vec<Row> {
    drain(
        store
            .scan(GROUP, None, None, ScanOptions::unlimited(ScanMode::Live))
            .unwrap(),
    )
}

/// `(table, first key column)` label, enough to pin a fixture row.
pub fn label(row: &Row) -> (String, i64) {
    let Value::Int(key) = row.values[0] else {
        panic!("fixture keys are integers, got {:?}", row.values[0]);
    };
    (row.table.name.clone(), key)
}

pub fn labels(rows: &[Row]) -> Vec<(String, i64)> {
    rows.iter().map(label).collect()
}
