//! Shared bootstrap helper for integration tests: stand up a fresh
//! engine against a temp data directory and register one clustered
//! index ready to insert into.

use small_engine::btree::BTree;
use small_engine::catalog::{ColumnDef, ColumnType, IndexSchema};
use small_engine::config::EngineConfig;
use small_engine::Engine;

/// Big-endian encoding so byte-lexicographic key order matches numeric
/// order, which is what every test's scan-order assertions rely on.
pub fn key_bytes(n: u32) -> Vec<u8> {
    n.to_be_bytes().to_vec()
}

pub fn config_in(dir: &std::path::Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.data_dir = dir.to_path_buf();
    config
}

/// Open a fresh engine, create one tablespace, and register a single
/// clustered index over it with an empty leaf root.
pub fn setup(table_id: u64, index_id: u64, space_id: u32, file_name: &str) -> (tempfile::TempDir, Engine, IndexSchema) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = config_in(tmp.path());
    let engine = Engine::open(config).expect("engine open");

    engine.create_table_space(space_id, file_name).expect("create tablespace");
    let root_page = engine.allocate_page(space_id).expect("allocate root page");

    let schema = IndexSchema {
        index_id,
        table_id,
        space_id,
        root_page,
        columns: vec![ColumnDef {
            name: "id".to_string(),
            ty: ColumnType::Int64,
        }],
        is_clustered: true,
        clustered_index_id: None,
    };
    BTree::init_leaf_root(&engine, &schema).expect("init leaf root");
    engine.catalog.register(schema.clone());

    (tmp, engine, schema)
}
