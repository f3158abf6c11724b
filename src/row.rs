//! Row operations: the layer that turns {insert, update, delete,
//! select} into locking, undo logging, and B+ tree mutations on the
//! clustered index and its secondary indexes. Callers go through here
//! rather than the tree directly so every write is locked and undo-
//! logged the same way regardless of which index it touches first.

use log::debug;

use crate::btree::BTree;
use crate::catalog::{IndexSchema, SchemaOracle};
use crate::engine::Engine;
use crate::error::Error;
use crate::lock::{RecordLockMode, RecordLockVariant, TableLockMode};
use crate::page::index_page::LeafPage;
use crate::page::record::{Record, SystemColumns};
use crate::txn::undo::UndoType;
use crate::txn::IsolationLevel;
use crate::types::{HeapNo, TrxId};

/// Pack `(trx_id, undo_no)` into the single `u64` `Record::system.roll_ptr`
/// has room for. A real rollback-segment/undo-page address is wider;
/// this stands in for it at the scale this engine targets (see
/// DESIGN.md's "roll pointer encoding" entry).
pub(crate) fn encode_roll_ptr(trx_id: TrxId, undo_no: u64) -> u64 {
    (trx_id << 32) | (undo_no & 0xFFFF_FFFF)
}

pub(crate) fn decode_roll_ptr(roll_ptr: u64) -> (TrxId, u64) {
    (roll_ptr >> 32, roll_ptr & 0xFFFF_FFFF)
}

pub struct RowStore<'e> {
    pub engine: &'e Engine,
    pub table_id: u64,
}

impl<'e> RowStore<'e> {
    pub fn new(engine: &'e Engine, table_id: u64) -> Self {
        Self { engine, table_id }
    }

    fn clustered(&self) -> Result<IndexSchema, Error> {
        self.engine
            .catalog
            .indexes_of_table(self.table_id)
            .into_iter()
            .find(|ix| ix.is_clustered)
            .ok_or_else(|| Error::SchemaError(format!("table {} has no clustered index", self.table_id)))
    }

    fn secondaries(&self) -> Vec<IndexSchema> {
        self.engine
            .catalog
            .indexes_of_table(self.table_id)
            .into_iter()
            .filter(|ix| !ix.is_clustered)
            .collect()
    }

    /// Approximate heap-no for lock granularity: the record's sorted
    /// position within its leaf at the moment of locking. Stable enough
    /// to tell two different keys in the same page apart; not a
    /// persistent slot id (see DESIGN.md's "page model" entry on why
    /// this engine doesn't track true heap numbers across mutations).
    fn heap_no_of(leaf: &LeafPage, key: &[u8]) -> HeapNo {
        leaf.lower_bound(key) as HeapNo
    }

    fn lock_for_insert(&self, trx_id: TrxId, schema: &IndexSchema, key: &[u8]) -> Result<(), Error> {
        self.engine
            .lock_manager
            .acquire_table_lock(trx_id, self.table_id, TableLockMode::IX)?;
        let leaf_id = BTree::new(self.engine, schema.clone()).find_leaf(key)?;
        let leaf = crate::btree::read_leaf(self.engine, leaf_id)?;
        let heap_no = Self::heap_no_of(&leaf, key);
        self.engine.lock_manager.acquire_record_lock(
            trx_id,
            leaf_id,
            heap_no,
            RecordLockMode {
                exclusive: true,
                variant: RecordLockVariant::InsertIntention,
            },
        )
    }

    fn lock_existing(
        &self,
        trx_id: TrxId,
        schema: &IndexSchema,
        key: &[u8],
        exclusive: bool,
        isolation: IsolationLevel,
    ) -> Result<(), Error> {
        let table_mode = if exclusive { TableLockMode::IX } else { TableLockMode::IS };
        self.engine
            .lock_manager
            .acquire_table_lock(trx_id, self.table_id, table_mode)?;
        let leaf_id = BTree::new(self.engine, schema.clone()).find_leaf(key)?;
        let leaf = crate::btree::read_leaf(self.engine, leaf_id)?;
        let heap_no = Self::heap_no_of(&leaf, key);
        // REPEATABLE_READ/SERIALIZABLE default to next-key locks to close
        // the phantom-insertion window; READ_COMMITTED/READ_UNCOMMITTED
        // lock only the record itself.
        let variant = match isolation {
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => {
                RecordLockVariant::NextKey
            }
            IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => {
                RecordLockVariant::RecNotGap
            }
        };
        self.engine.lock_manager.acquire_record_lock(
            trx_id,
            leaf_id,
            heap_no,
            RecordLockMode { exclusive, variant },
        )
    }

    /// Insert a new row: clustered index first (undo-logged as a pure
    /// INSERT, which rollback undoes by deleting), then every secondary
    /// index keyed by `{indexed columns..., primary key}`.
    pub fn insert(&self, trx_id: TrxId, fields: Vec<Vec<u8>>) -> Result<(), Error> {
        let clustered = self.clustered()?;
        let key = fields.first().cloned().unwrap_or_default();

        self.lock_for_insert(trx_id, &clustered, &key)?;

        let undo_no = self.engine.trx_manager.append_undo(
            trx_id,
            UndoType::Insert,
            self.table_id,
            key.clone(),
            Vec::new(),
            None,
        );

        let system = SystemColumns {
            trx_id,
            roll_ptr: Some(encode_roll_ptr(trx_id, undo_no)),
        };
        let record = Record::new(0, fields.clone(), Some(system));
        let tree = BTree::new(self.engine, clustered);
        tree.insert(record)?;

        for secondary in self.secondaries() {
            self.lock_for_insert(trx_id, &secondary, &key)?;
            let sec_fields = vec![key.clone(), key.clone()];
            let sec_record = Record::new(0, sec_fields, None);
            BTree::new(self.engine, secondary).insert(sec_record)?;
        }

        debug!("trx {} inserted key {:?} into table {}", trx_id, key, self.table_id);
        Ok(())
    }

    /// Fetch the visible version of `key` under `trx_id`'s isolation
    /// level, walking the roll-ptr chain backward through undo records
    /// until a version whose `trx_id` the caller's read view accepts.
    pub fn select(
        &self,
        trx_id: TrxId,
        key: &[u8],
        isolation: IsolationLevel,
        for_update: bool,
    ) -> Result<Option<Vec<Vec<u8>>>, Error> {
        let clustered = self.clustered()?;
        if isolation == IsolationLevel::ReadCommitted {
            self.engine.trx_manager.refresh_view(trx_id);
        }
        self.lock_existing(trx_id, &clustered, key, for_update, isolation)?;

        let tree = BTree::new(self.engine, clustered);
        let Some(record) = tree.search(key)? else {
            return Ok(None);
        };

        self.resolve_visible_version(trx_id, record)
    }

    /// Walk a record's version chain until a version this transaction's
    /// read view accepts, or until the chain is exhausted (meaning the
    /// row did not exist as of this snapshot).
    fn resolve_visible_version(
        &self,
        trx_id: TrxId,
        mut record: Record,
    ) -> Result<Option<Vec<Vec<u8>>>, Error> {
        loop {
            let Some(sys) = record.system else {
                return Ok(if record.is_deleted() { None } else { Some(record.fields) });
            };
            if self.engine.trx_manager.is_visible(trx_id, sys.trx_id) {
                return Ok(if record.is_deleted() { None } else { Some(record.fields) });
            }
            let Some(roll_ptr) = sys.roll_ptr else {
                return Ok(None);
            };
            let (owner_trx, undo_no) = decode_roll_ptr(roll_ptr);
            let Some(prev) = self.engine.trx_manager.lookup_undo(owner_trx, undo_no) else {
                return Ok(None);
            };
            if matches!(prev.undo_type, UndoType::Insert) {
                // Undoing the insert means the row didn't exist yet.
                return Ok(None);
            }
            // The reconstructed version was written by whoever owns the
            // chain's next link, not by `owner_trx` (that's just who
            // wrote the version we're undoing away from).
            let prior_writer = match prev.prev_roll_ptr {
                Some(rp) => decode_roll_ptr(rp).0,
                None => owner_trx,
            };
            record = Record::new(
                record.heap_no,
                prev.previous_fields.clone(),
                Some(SystemColumns {
                    trx_id: prior_writer,
                    roll_ptr: prev.prev_roll_ptr,
                }),
            );
        }
    }

    /// Update a row in place: captures the pre-image as an
    /// `UpdateExisting` undo record, then overwrites the clustered-index
    /// record's fields and system columns. Secondary indexes are
    /// rebuilt only when their indexed columns actually changed.
    pub fn update(&self, trx_id: TrxId, key: &[u8], new_fields: Vec<Vec<u8>>) -> Result<(), Error> {
        let clustered = self.clustered()?;
        self.lock_existing(trx_id, &clustered, key, true, IsolationLevel::RepeatableRead)?;

        let tree = BTree::new(self.engine, clustered.clone());
        let current = tree
            .search(key)?
            .ok_or(Error::RowNotFound)?;
        let prev_roll_ptr = current.system.and_then(|s| s.roll_ptr);

        let undo_no = self.engine.trx_manager.append_undo(
            trx_id,
            UndoType::UpdateExisting,
            self.table_id,
            key.to_vec(),
            current.fields.clone(),
            prev_roll_ptr,
        );

        tree.delete_mark(key, trx_id, Some(encode_roll_ptr(trx_id, undo_no)))?;
        tree.purge(key)?;

        let system = SystemColumns {
            trx_id,
            roll_ptr: Some(encode_roll_ptr(trx_id, undo_no)),
        };
        let record = Record::new(0, new_fields, Some(system));
        tree.insert(record)?;
        Ok(())
    }

    /// Delete-mark a row (the only form row operations expose to
    /// callers; physical removal happens later via `BTree::purge` once
    /// the purge worker decides no read view still needs it).
    pub fn delete(&self, trx_id: TrxId, key: &[u8]) -> Result<(), Error> {
        let clustered = self.clustered()?;
        self.lock_existing(trx_id, &clustered, key, true, IsolationLevel::RepeatableRead)?;

        let tree = BTree::new(self.engine, clustered);
        let current = tree.search(key)?.ok_or(Error::RowNotFound)?;
        let prev_roll_ptr = current.system.and_then(|s| s.roll_ptr);

        let undo_no = self.engine.trx_manager.append_undo(
            trx_id,
            UndoType::DeleteMark,
            self.table_id,
            key.to_vec(),
            current.fields.clone(),
            prev_roll_ptr,
        );
        tree.delete_mark(key, trx_id, Some(encode_roll_ptr(trx_id, undo_no)))
    }

    /// Full table scan filtered to the versions visible under `trx_id`.
    pub fn scan(&self, trx_id: TrxId, isolation: IsolationLevel) -> Result<Vec<Vec<Vec<u8>>>, Error> {
        let clustered = self.clustered()?;
        if isolation == IsolationLevel::ReadCommitted {
            self.engine.trx_manager.refresh_view(trx_id);
        }
        self.engine
            .lock_manager
            .acquire_table_lock(trx_id, self.table_id, TableLockMode::IS)?;

        let tree = BTree::new(self.engine, clustered);
        let mut out = Vec::new();
        for record in tree.scan_all()? {
            if let Some(fields) = self.resolve_visible_version(trx_id, record)? {
                out.push(fields);
            }
        }
        Ok(out)
    }
}
