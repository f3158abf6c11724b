//! Rolling back a transaction that crash recovery found incomplete:
//! `adopt_recovered` stands in for what `recover()` would have fed it
//! from the WAL, and `rollback_recovered_transactions` must apply each
//! undo record's logical inverse for real, not just log and drop it.

mod common;

use small_engine::btree::BTree;
use small_engine::row::RowStore;
use small_engine::txn::IsolationLevel;

fn row(n: u32, label: &str) -> Vec<Vec<u8>> {
    vec![common::key_bytes(n), label.as_bytes().to_vec()]
}

#[test]
fn rolling_back_a_recovered_insert_purges_the_row() {
    let (_tmp, engine, schema) = common::setup(20, 20, 20, "recover1.ibd");
    let store = RowStore::new(&engine, schema.table_id);
    let tree = BTree::new(&engine, schema.clone());
    let key = common::key_bytes(1);

    let trx = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.insert(trx, row(1, "alice")).expect("insert");
    assert!(tree.search(&key).unwrap().is_some());

    // The insert is this transaction's first and only undo entry, so
    // its undo_no is 0 — standing in for what recovery would have
    // decoded straight off the WAL's UndoInsert record.
    let undo_rec = engine.trx_manager.lookup_undo(trx, 0).expect("undo logged for the insert");
    engine.trx_manager.adopt_recovered(trx, vec![undo_rec]);

    let rolled_back = engine.rollback_recovered_transactions().expect("rollback");
    assert_eq!(rolled_back, 1);

    assert!(
        tree.search(&key).unwrap().is_none(),
        "undoing an insert must physically remove the row"
    );
}

#[test]
fn rolling_back_a_recovered_update_restores_the_previous_fields() {
    let (_tmp, engine, schema) = common::setup(21, 21, 21, "recover2.ibd");
    let store = RowStore::new(&engine, schema.table_id);
    let tree = BTree::new(&engine, schema.clone());
    let key = common::key_bytes(1);

    let seed = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.insert(seed, row(1, "v1")).expect("seed insert");
    engine.trx_manager.commit(seed).expect("seed commit");

    let updater = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.update(updater, &key, row(1, "v2")).expect("update");
    assert_eq!(tree.search(&key).unwrap().unwrap().fields, row(1, "v2"));

    let undo_rec = engine
        .trx_manager
        .lookup_undo(updater, 0)
        .expect("undo logged for the update");
    engine.trx_manager.adopt_recovered(updater, vec![undo_rec]);
    engine.rollback_recovered_transactions().expect("rollback");

    let restored = tree.search(&key).unwrap().expect("row still present");
    assert_eq!(restored.fields, row(1, "v1"));
    assert!(!restored.is_deleted());
}

#[test]
fn rolling_back_a_recovered_delete_unmarks_the_row() {
    let (_tmp, engine, schema) = common::setup(22, 22, 22, "recover3.ibd");
    let store = RowStore::new(&engine, schema.table_id);
    let tree = BTree::new(&engine, schema.clone());
    let key = common::key_bytes(1);

    let seed = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.insert(seed, row(1, "alice")).expect("seed insert");
    engine.trx_manager.commit(seed).expect("seed commit");

    let deleter = engine.trx_manager.begin(IsolationLevel::RepeatableRead);
    store.delete(deleter, &key).expect("delete");
    assert!(tree.search(&key).unwrap().unwrap().is_deleted());

    let undo_rec = engine
        .trx_manager
        .lookup_undo(deleter, 0)
        .expect("undo logged for the delete");
    engine.trx_manager.adopt_recovered(deleter, vec![undo_rec]);
    engine.rollback_recovered_transactions().expect("rollback");

    let restored = tree.search(&key).unwrap().expect("row still present");
    assert!(!restored.is_deleted(), "undoing a delete-mark must clear the delete bit");
    assert_eq!(restored.fields, row(1, "alice"));
}
