//! Row-layer MVCC: a REPEATABLE READ transaction's snapshot must not
//! observe rows committed by other transactions after it began, while
//! a fresh transaction started afterward sees them.

mod common;

use small_engine::row::RowStore;
use small_engine::txn::IsolationLevel;

fn row(n: u32, label: &str) -> Vec<Vec<u8>> {
    vec![common::key_bytes(n), label.as_bytes().to_vec()]
}

#[test]
fn repeatable_read_does_not_see_concurrent_commits() {
    let (_tmp, engine, schema) = common::setup(10, 10, 10, "mvcc.ibd");
    let store = RowStore::new(&engine, schema.table_id);

    let seed = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.insert(seed, row(1, "alice")).expect("seed insert");
    engine.trx_manager.commit(seed).expect("seed commit");

    let reader = engine.trx_manager.begin(IsolationLevel::RepeatableRead);

    let seen_seed = store
        .select(reader, &common::key_bytes(1), IsolationLevel::RepeatableRead, false)
        .expect("select");
    assert_eq!(seen_seed, Some(row(1, "alice")));

    let writer = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.insert(writer, row(2, "bob")).expect("writer insert");
    engine.trx_manager.commit(writer).expect("writer commit");

    let still_missing = store
        .select(reader, &common::key_bytes(2), IsolationLevel::RepeatableRead, false)
        .expect("select");
    assert!(
        still_missing.is_none(),
        "a snapshot taken before the writer's commit must not see its row"
    );

    engine.trx_manager.commit(reader).expect("reader commit");

    let fresh = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    let now_visible = store
        .select(fresh, &common::key_bytes(2), IsolationLevel::RepeatableRead, false)
        .expect("select");
    assert_eq!(now_visible, Some(row(2, "bob")));
    engine.trx_manager.commit(fresh).expect("fresh commit");
}

#[test]
fn update_is_visible_through_roll_ptr_chain_to_old_snapshot_only_for_old_value() {
    let (_tmp, engine, schema) = common::setup(11, 11, 11, "mvcc2.ibd");
    let store = RowStore::new(&engine, schema.table_id);

    let seed = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.insert(seed, row(1, "v1")).expect("seed insert");
    engine.trx_manager.commit(seed).expect("seed commit");

    let reader = engine.trx_manager.begin(IsolationLevel::RepeatableRead);

    let updater = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.update(updater, &common::key_bytes(1), row(1, "v2")).expect("update");
    engine.trx_manager.commit(updater).expect("updater commit");

    let seen_by_reader = store
        .select(reader, &common::key_bytes(1), IsolationLevel::RepeatableRead, false)
        .expect("select");
    assert_eq!(
        seen_by_reader,
        Some(row(1, "v1")),
        "reader's snapshot predates the update and must still see the old value"
    );
    engine.trx_manager.commit(reader).expect("reader commit");

    let fresh = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    let seen_by_fresh = store
        .select(fresh, &common::key_bytes(1), IsolationLevel::RepeatableRead, false)
        .expect("select");
    assert_eq!(seen_by_fresh, Some(row(1, "v2")));
}

#[test]
fn delete_removes_row_from_later_snapshots_but_not_earlier_ones() {
    let (_tmp, engine, schema) = common::setup(12, 12, 12, "mvcc3.ibd");
    let store = RowStore::new(&engine, schema.table_id);

    let seed = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.insert(seed, row(1, "alice")).expect("seed insert");
    engine.trx_manager.commit(seed).expect("seed commit");

    let reader = engine.trx_manager.begin(IsolationLevel::RepeatableRead);

    let deleter = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.delete(deleter, &common::key_bytes(1)).expect("delete");
    engine.trx_manager.commit(deleter).expect("deleter commit");

    let still_there = store
        .select(reader, &common::key_bytes(1), IsolationLevel::RepeatableRead, false)
        .expect("select");
    assert_eq!(still_there, Some(row(1, "alice")));
    engine.trx_manager.commit(reader).expect("reader commit");

    let fresh = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    let gone = store
        .select(fresh, &common::key_bytes(1), IsolationLevel::RepeatableRead, false)
        .expect("select");
    assert!(gone.is_none());
}
