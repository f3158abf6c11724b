//! Durability: data written before a normal shutdown must be readable
//! after reopening the engine against the same data directory.

mod common;

use small_engine::btree::BTree;
use small_engine::catalog::{ColumnDef, ColumnType, IndexSchema};
use small_engine::page::record::Record;
use small_engine::{Engine, ShutdownMode};

fn schema_for(space_id: u32, root_page: u32) -> IndexSchema {
    IndexSchema {
        index_id: 1,
        table_id: 1,
        space_id,
        root_page,
        columns: vec![ColumnDef {
            name: "id".to_string(),
            ty: ColumnType::Int64,
        }],
        is_clustered: true,
        clustered_index_id: None,
    }
}

#[test]
fn data_survives_shutdown_and_reopen() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = common::config_in(tmp.path());
    let space_id = 1;
    let root_page;

    {
        let engine = Engine::open(config.clone()).expect("open");
        engine.create_table_space(space_id, "durable.ibd").expect("create space");
        root_page = engine.allocate_page(space_id).expect("allocate root");

        let schema = schema_for(space_id, root_page);
        BTree::init_leaf_root(&engine, &schema).expect("init root");
        engine.catalog.register(schema.clone());

        let tree = BTree::new(&engine, schema);
        for i in 0..50u32 {
            let key = common::key_bytes(i);
            tree.insert(Record::new(0, vec![key], None)).expect("insert");
        }

        engine.shutdown(ShutdownMode::Normal).expect("shutdown");
    }

    let engine = Engine::open(config).expect("reopen");
    engine.open_table_space(space_id, "durable.ibd").expect("open space");
    let schema = schema_for(space_id, root_page);
    engine.catalog.register(schema.clone());

    let tree = BTree::new(&engine, schema);
    let all = tree.scan_all().expect("scan after reopen");
    assert_eq!(all.len(), 50);
    for (i, rec) in all.iter().enumerate() {
        assert_eq!(rec.key(), common::key_bytes(i as u32).as_slice());
    }
}

#[test]
fn no_flush_shutdown_still_closes_cleanly() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = common::config_in(tmp.path());
    let engine = Engine::open(config).expect("open");
    engine.create_table_space(1, "noflush.ibd").expect("create space");
    engine.shutdown(ShutdownMode::NoFlush).expect("shutdown without flush");
}
