//! Data-dictionary stand-in: an index-id -> schema lookup oracle. The
//! data dictionary's on-disk persistence format is an external
//! collaborator's concern; this is the in-memory oracle the rest of
//! the engine is written against.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{IndexId, PageNo, SpaceId};
use crate::utils::HandyRwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Bytes,
}

#[derive(Clone, Debug)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

/// Everything the B+ tree / row-ops layer needs about one index:
/// column list, whether it's the table's clustered index, and where
/// its root page lives.
#[derive(Clone, Debug)]
pub struct IndexSchema {
    pub index_id: IndexId,
    pub table_id: u64,
    pub space_id: SpaceId,
    pub root_page: PageNo,
    pub columns: Vec<ColumnDef>,
    pub is_clustered: bool,
    /// For a secondary index, the clustered index it resolves into for
    /// MVCC reads.
    pub clustered_index_id: Option<IndexId>,
}

pub trait SchemaOracle: Send + Sync {
    fn lookup(&self, index_id: IndexId) -> Option<IndexSchema>;
    fn indexes_of_table(&self, table_id: u64) -> Vec<IndexSchema>;
}

#[derive(Default)]
pub struct InMemoryCatalog {
    indexes: RwLock<HashMap<IndexId, IndexSchema>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, schema: IndexSchema) {
        self.indexes.wl().insert(schema.index_id, schema);
    }

    pub fn set_root_page(&self, index_id: IndexId, root_page: PageNo) {
        if let Some(schema) = self.indexes.wl().get_mut(&index_id) {
            schema.root_page = root_page;
        }
    }
}

impl SchemaOracle for InMemoryCatalog {
    fn lookup(&self, index_id: IndexId) -> Option<IndexSchema> {
        self.indexes.rl().get(&index_id).cloned()
    }

    fn indexes_of_table(&self, table_id: u64) -> Vec<IndexSchema> {
        self.indexes
            .rl()
            .values()
            .filter(|s| s.table_id == table_id)
            .cloned()
            .collect()
    }
}
