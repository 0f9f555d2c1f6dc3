//! Cursor and transaction-window scan behavior

mod common;

use common::*;
use grove_store::{HKey, HKeySegment, KeyValue, ScanMode, ScanOptions, Value};

fn customer_bound(cid: i64) -> HKey {
    HKey::new(vec![HKeySegment {
        ordinal: 1,
        values: vec![KeyValue::Value(Value::Int(cid))],
    }])
}

#[test]
fn full_scan_is_depth_first_preorder() {
    let store = open_store();
    populate_nested(&store);

    let rows = full_scan(&store);
    assert_eq!(labels(&rows), expected_nested_labels());
}

#[test]
fn bounded_scan_covers_one_subtree() {
    let store = open_store();
    populate_nested(&store);

    let lower = customer_bound(2);
    let upper = customer_bound(3);
    let rows = drain(
        store
            .scan(
                GROUP,
                Some(&lower),
                Some(&upper),
                ScanOptions::unlimited(ScanMode::Live),
            )
            .unwrap(),
    );

    let mut expected = vec![("customers".to_string(), 2)];
    for oid in [21i64, 22, 23] {
        expected.push(("orders".to_string(), oid));
        for i in 1..=3i64 {
            expected.push(("items".to_string(), oid * 10 + i));
        }
    }
    assert_eq!(labels(&rows), expected);
}

#[test]
fn window_limits_and_modes_are_sequence_equivalent() {
    let store = open_store();
    populate_flat(&store, 5, 10);

    let baseline = full_scan(&store);
    assert_eq!(baseline.len(), 55);

    let variants = [
        ScanOptions::unlimited(ScanMode::Live).with_row_limit(1),
        ScanOptions::unlimited(ScanMode::Live).with_row_limit(2),
        ScanOptions::unlimited(ScanMode::Live).with_time_limit_ms(2),
        ScanOptions::unlimited(ScanMode::Snapshot),
        ScanOptions::unlimited(ScanMode::Snapshot).with_row_limit(1),
        ScanOptions::unlimited(ScanMode::Snapshot)
            .with_row_limit(2)
            .with_time_limit_ms(2),
    ];
    for options in variants {
        let rows = drain(store.scan(GROUP, None, None, options).unwrap());
        assert_eq!(rows, baseline, "scan with {options:?} diverged");
    }
}

#[test]
fn row_limit_rotates_backing_transactions() {
    let store = open_store();
    populate_nested(&store);

    let before = store.metrics().snapshot();
    let rows = drain(
        store
            .scan(
                GROUP,
                None,
                None,
                ScanOptions::unlimited(ScanMode::Snapshot).with_row_limit(10),
            )
            .unwrap(),
    );
    assert_eq!(rows.len(), 39);

    // 39 rows at 10 per window: three rotations across four windows.
    let after = store.metrics().snapshot();
    assert_eq!(after.scan_rotations - before.scan_rotations, 3);
    assert_eq!(after.scan_windows - before.scan_windows, 4);
}

#[test]
fn concurrent_scans_do_not_perturb_each_other() {
    let store = open_store();
    populate_flat(&store, 5, 10);

    let expected = full_scan(&store);
    let mut narrow = store
        .scan(
            GROUP,
            None,
            None,
            ScanOptions::unlimited(ScanMode::Snapshot).with_row_limit(1),
        )
        .unwrap();
    let mut wide = store
        .scan(
            GROUP,
            None,
            None,
            ScanOptions::unlimited(ScanMode::Live).with_row_limit(10),
        )
        .unwrap();

    let mut narrow_rows = Vec::new();
    let mut wide_rows = Vec::new();
    loop {
        let a = narrow.next().unwrap();
        let b = wide.next().unwrap();
        if a.is_none() && b.is_none() {
            break;
        }
        narrow_rows.extend(a);
        wide_rows.extend(b);
    }

    assert_eq!(narrow_rows, expected);
    assert_eq!(wide_rows, expected);
}

#[test]
fn close_then_reopen_reproduces_the_sequence() {
    let store = open_store();
    populate_nested(&store);

    let mut scan = store
        .scan(GROUP, None, None, ScanOptions::unlimited(ScanMode::Live))
        .unwrap();
    scan.next().unwrap().unwrap();
    scan.next().unwrap().unwrap();
    scan.close();
    assert!(scan.next().unwrap().is_none());

    let first = full_scan(&store);
    let second = full_scan(&store);
    assert_eq!(first, second);
    assert_eq!(labels(&first), expected_nested_labels());
}

#[test]
fn snapshot_scan_ignores_commits_landing_mid_scan() {
    let store = open_store();
    populate_nested(&store);

    let mut scan = store
        .scan(GROUP, None, None, ScanOptions::unlimited(ScanMode::Snapshot))
        .unwrap();
    scan.next().unwrap().unwrap();

    let mut writer = store.begin();
    store
        .write_row(
            &mut writer,
            GROUP,
            &customers(),
            vec![Value::Int(9), Value::string("late")],
        )
        .unwrap();
    writer.commit().unwrap();

    let rest = {
        let mut rows = Vec::new();
        while let Some(row) = scan.next().unwrap() {
            rows.push(row);
        }
        rows
    };
    assert!(!labels(&rest).contains(&("customers".to_string(), 9)));
    assert_eq!(rest.len(), expected_nested_labels().len() - 1);
}

#[test]
fn live_windows_observe_the_latest_committed_state() {
    let store = open_store();
    populate_nested(&store);

    let mut scan = store
        .scan(
            GROUP,
            None,
            None,
            ScanOptions::unlimited(ScanMode::Live).with_row_limit(1),
        )
        .unwrap();
    scan.next().unwrap().unwrap();

    // Lands past the current position, so a later window serves it.
    let mut writer = store.begin();
    store
        .write_row(
            &mut writer,
            GROUP,
            &customers(),
            vec![Value::Int(9), Value::string("late")],
        )
        .unwrap();
    writer.commit().unwrap();

    let mut rows = Vec::new();
    while let Some(row) = scan.next().unwrap() {
        rows.push(row);
    }
    assert_eq!(labels(&rows).last(), Some(&("customers".to_string(), 9)));
}

#[test]
fn cursor_inside_a_transaction_sees_its_own_writes() {
    let store = open_store();
    populate_nested(&store);

    let mut txn = store.begin();
    store
        .write_row(
            &mut txn,
            GROUP,
            &customers(),
            vec![Value::Int(4), Value::string("uncommitted")],
        )
        .unwrap();

    let mut cursor = store.open_cursor(txn, GROUP, None, None).unwrap();
    let mut seen = Vec::new();
    while let Some(row) = cursor.next().unwrap() {
        seen.push(label(&row));
    }
    cursor.close().rollback();

    assert!(seen.contains(&("customers".to_string(), 4)));

    // The rolled-back write never becomes visible elsewhere.
    assert_eq!(labels(&full_scan(&store)), expected_nested_labels());
}

#[test]
fn invalid_scan_options_are_rejected() {
    let store = open_store();
    populate_nested(&store);

    for options in [
        ScanOptions::unlimited(ScanMode::Live).with_row_limit(0),
        ScanOptions::unlimited(ScanMode::Live).with_time_limit_ms(-5),
    ] {
        let err = store
            .scan(GROUP, None, None, options)
            .err()
            .expect("invalid options must be rejected");
        assert!(matches!(err, grove_store::Error::ConfigurationError(_)));
    }
}
