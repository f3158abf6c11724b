//! Crash recovery: analysis, redo, and undo passes.
//!
//! 1. **Analysis.** Scan from the last checkpoint, tracking which
//!    transactions started without a matching COMMIT/ABORT, and
//!    collecting their undo records. Runs inside `Engine::open`,
//!    before tablespaces or the catalog exist.
//! 2. **Redo.** Re-apply every physiological page write whose effects
//!    are not already on disk. Also runs inside `Engine::open`.
//! 3. **Undo.** For each transaction left ACTIVE at crash time, roll it
//!    back by applying the logical inverse of each undo record
//!    newest-first, through fresh MTRs (so the rollback is itself
//!    recoverable). This needs the catalog and tablespaces, so it
//!    doesn't run until the caller invokes `Engine::
//!    rollback_recovered_transactions` — `recover` only adopts the
//!    incomplete transactions, `rollback_incomplete` does the work.

use std::collections::{HashMap, HashSet};

use log::{info, warn};

use crate::btree::BTree;
use crate::catalog::SchemaOracle;
use crate::engine::Engine;
use crate::error::Error;
use crate::log::record::LogBody;
use crate::page::record::{Record, SystemColumns};
use crate::page::{self, Decodeable, PageHeader};
use crate::row::decode_roll_ptr;
use crate::storage::buffer_pool::LatchMode;
use crate::txn::undo::{UndoRecord, UndoType};
use crate::types::{PageId, TrxId};
use crate::utils::HandyRwLock;

pub fn recover(engine: &Engine) -> Result<(), Error> {
    let start_lsn = engine.log_manager.checkpoint_lsn();
    let records = engine.log_manager.read_from(start_lsn)?;
    if records.is_empty() {
        info!("recovery: nothing to replay from lsn {}", start_lsn);
        return Ok(());
    }

    // --- Analysis ---
    let mut started: HashSet<TrxId> = HashSet::new();
    let mut completed: HashSet<TrxId> = HashSet::new();
    let mut undo: HashMap<TrxId, Vec<UndoRecord>> = HashMap::new();

    for r in &records {
        match &r.body {
            LogBody::TrxStart { trx_id } => {
                started.insert(*trx_id);
            }
            LogBody::TrxCommit { trx_id } | LogBody::TrxAbort { trx_id } => {
                completed.insert(*trx_id);
            }
            LogBody::UndoInsert { trx_id, record, .. } => {
                let mut pos = 0usize;
                match UndoRecord::decode(record, &mut pos) {
                    Ok(rec) => undo.entry(*trx_id).or_default().push(rec),
                    Err(e) => warn!("dropping corrupt undo record for trx {}: {}", trx_id, e),
                }
            }
            _ => {}
        }
    }

    let incomplete: Vec<TrxId> = started.difference(&completed).copied().collect();
    info!(
        "recovery analysis: {} transactions, {} incomplete",
        started.len(),
        incomplete.len()
    );

    // --- Redo ---
    let mut redone = 0usize;
    for r in &records {
        let id = PageId::new(r.space_id, r.page_no);
        match &r.body {
            LogBody::WriteBytes { offset, bytes } => {
                if apply_write(engine, id, *offset, bytes)? {
                    redone += 1;
                }
            }
            _ => {}
        }
    }
    info!("recovery redo: applied {} writes", redone);

    // --- Undo ---
    // Applying the inverse of each undo record needs the catalog and
    // tablespaces, neither of which exist yet this early in `Engine::
    // open`. Adopt the incomplete transactions into the transaction
    // manager instead; the caller rolls them back for real via
    // `Engine::rollback_recovered_transactions` once the data
    // dictionary is back in place, the way InnoDB defers rollback of
    // recovered transactions until after the dictionary loads.
    for trx_id in incomplete {
        let entries = undo.remove(&trx_id).unwrap_or_default();
        if entries.is_empty() {
            warn!(
                "trx {} left active at crash with no undo entries; nothing to roll back",
                trx_id
            );
            continue;
        }
        warn!(
            "trx {} left active at crash with {} undo entries; queued for rollback",
            trx_id,
            entries.len()
        );
        engine.trx_manager.adopt_recovered(trx_id, entries);
    }

    Ok(())
}

/// Roll back every transaction `recover` found incomplete, applying
/// each undo record's logical inverse through the B+ tree (each
/// mutation goes through a fresh MTR, same as a live row operation).
/// Call once tablespaces and the catalog are registered.
pub fn rollback_incomplete(engine: &Engine) -> Result<usize, Error> {
    let mut n = 0;
    for trx_id in engine.trx_manager.drain_recovered() {
        engine
            .trx_manager
            .rollback(trx_id, |rec| apply_undo_record(engine, rec))?;
        n += 1;
    }
    if n > 0 {
        info!("recovery rollback: rolled back {} incomplete transactions", n);
    }
    Ok(n)
}

fn apply_undo_record(engine: &Engine, rec: &UndoRecord) -> Result<(), Error> {
    let schema = engine
        .catalog
        .indexes_of_table(rec.table_id)
        .into_iter()
        .find(|ix| ix.is_clustered)
        .ok_or_else(|| Error::SchemaError(format!("table {} has no clustered index", rec.table_id)))?;
    let tree = BTree::new(engine, schema);

    match rec.undo_type {
        UndoType::Insert => tree.purge(&rec.primary_key),
        UndoType::UpdateExisting => {
            tree.delete_mark(&rec.primary_key, 0, rec.prev_roll_ptr)?;
            tree.purge(&rec.primary_key)?;
            let prior_writer = rec.prev_roll_ptr.map(|rp| decode_roll_ptr(rp).0).unwrap_or(0);
            let system = SystemColumns {
                trx_id: prior_writer,
                roll_ptr: rec.prev_roll_ptr,
            };
            tree.insert(Record::new(0, rec.previous_fields.clone(), Some(system)))
        }
        UndoType::DeleteMark => tree.undo_delete_mark(&rec.primary_key, rec.prev_roll_ptr),
    }
}

fn apply_write(engine: &Engine, id: PageId, offset: u16, bytes: &[u8]) -> Result<bool, Error> {
    let frame = match engine.buffer_pool.get(id, LatchMode::Exclusive) {
        Ok(f) => f,
        Err(_) => return Ok(false),
    };

    let mut data = frame.data.wl();
    let start = offset as usize;
    if start + bytes.len() > data.len() {
        return Ok(false);
    }
    data[start..start + bytes.len()].copy_from_slice(bytes);

    if let Ok(mut header) = PageHeader::read_from(&*data) {
        header.write_to(&mut *data);
    }
    page::stamp_trailer(&mut *data, 0);
    drop(data);
    engine.buffer_pool.unpin(id);
    Ok(true)
}
