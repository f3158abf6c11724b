//! Transaction manager: ids, active-transaction table, rollback
//! segments (undo logs), and MVCC read views. Row operations and the
//! B+ tree both call into this for undo writing and commit/rollback.

pub mod read_view;
pub mod undo;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::{debug, info};

use crate::error::Error;
use crate::lock::LockManager;
use crate::log::record::{LogBody, LogRecord};
use crate::log::LogManager;
use crate::types::TrxId;

use read_view::ReadView;
use undo::{RollbackSegment, UndoType};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TransactionState {
    NotStarted,
    Active,
    Prepared,
    CommittedInMemory,
    Aborted,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

pub struct Transaction {
    pub id: TrxId,
    pub state: TransactionState,
    pub isolation: IsolationLevel,
    pub read_view: Option<ReadView>,
    pub start_lsn: crate::types::Lsn,
    pub commit_lsn: Option<crate::types::Lsn>,
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transaction<{}, {:?}>", self.id, self.state)
    }
}

struct Inner {
    next_trx_id: AtomicU64,
    active: HashMap<TrxId, Transaction>,
    rollback_segment: RollbackSegment,
    recently_committed: Vec<TrxId>,
    /// Transactions adopted by crash recovery because they were left
    /// active at crash time. Drained by `drain_recovered` once the
    /// caller is ready to roll them back (see `Engine::
    /// rollback_recovered_transactions`).
    recovered: Vec<TrxId>,
}

pub struct TransactionManager {
    inner: Mutex<Inner>,
    lock_manager: std::sync::Arc<LockManager>,
    log_manager: std::sync::Arc<LogManager>,
}

impl TransactionManager {
    pub fn new(lock_manager: std::sync::Arc<LockManager>, log_manager: std::sync::Arc<LogManager>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_trx_id: AtomicU64::new(1),
                active: HashMap::new(),
                rollback_segment: RollbackSegment::new(0),
                recently_committed: Vec::new(),
                recovered: Vec::new(),
            }),
            lock_manager,
            log_manager,
        }
    }

    /// Allocate a transaction object in `ACTIVE` state. A read view is
    /// created now for REPEATABLE_READ/SERIALIZABLE; READ_COMMITTED
    /// transactions get a fresh one per statement via `refresh_view`.
    pub fn begin(&self, isolation: IsolationLevel) -> TrxId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_trx_id.fetch_add(1, Ordering::SeqCst);
        let start_lsn = self.log_manager.write_lsn();

        let read_view = if matches!(
            isolation,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        ) {
            Some(Self::build_view(&inner, id))
        } else {
            None
        };

        inner.active.insert(
            id,
            Transaction {
                id,
                state: TransactionState::Active,
                isolation,
                read_view,
                start_lsn,
                commit_lsn: None,
            },
        );
        drop(inner);

        let record = LogRecord {
            space_id: 0,
            page_no: 0,
            body: LogBody::TrxStart { trx_id: id },
        };
        // Not its own commit group; it rides along with whichever MTR
        // or commit/rollback next closes the log with a `MultiRecEnd`,
        // which is fine for analysis (it only needs the record to show
        // up at all, not to own a group of its own).
        let _ = self.log_manager.append(&[record]);

        debug!("begin trx {}", id);
        id
    }

    fn build_view(inner: &Inner, creator_id: TrxId) -> ReadView {
        let active_ids: Vec<TrxId> = inner.active.keys().copied().collect();
        let next = inner.next_trx_id.load(Ordering::SeqCst);
        ReadView::new(creator_id, active_ids, next)
    }

    /// READ_COMMITTED transactions call this before each statement.
    pub fn refresh_view(&self, trx_id: TrxId) {
        let mut inner = self.inner.lock().unwrap();
        let view = Self::build_view(&inner, trx_id);
        if let Some(trx) = inner.active.get_mut(&trx_id) {
            if trx.isolation == IsolationLevel::ReadCommitted {
                trx.read_view = Some(view);
            }
        }
    }

    pub fn append_undo(
        &self,
        trx_id: TrxId,
        undo_type: UndoType,
        table_id: u64,
        primary_key: Vec<u8>,
        previous_fields: Vec<Vec<u8>>,
        prev_roll_ptr: Option<u64>,
    ) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let log = inner.rollback_segment.open_log(trx_id);
        let undo_no = log.append(
            undo_type.clone(),
            table_id,
            primary_key.clone(),
            previous_fields.clone(),
            prev_roll_ptr,
        );
        drop(inner);

        // Persist the pre-image to the WAL too, not just in memory, so
        // a crash before commit can still roll this mutation back.
        let rec = undo::UndoRecord {
            undo_type,
            table_id,
            undo_no,
            primary_key,
            previous_fields,
            prev_roll_ptr,
        };
        let mut bytes = Vec::new();
        use crate::page::Encodeable;
        rec.encode(&mut bytes);
        let log_record = LogRecord {
            space_id: 0,
            page_no: 0,
            body: LogBody::UndoInsert {
                trx_id,
                undo_no,
                record: bytes,
            },
        };
        let _ = self.log_manager.append(&[log_record]);

        undo_no
    }

    /// Called by recovery to reinstate a transaction left active at
    /// crash time, with the undo records recovery decoded off the WAL,
    /// so it can later be rolled back through the normal `rollback`
    /// path once the catalog is back in place.
    pub fn adopt_recovered(&self, trx_id: TrxId, records: Vec<undo::UndoRecord>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.next_trx_id.load(Ordering::SeqCst) <= trx_id {
            inner.next_trx_id.store(trx_id + 1, Ordering::SeqCst);
        }
        inner
            .rollback_segment
            .logs
            .insert(trx_id, undo::UndoLog::from_recovered(trx_id, records));
        inner.active.insert(
            trx_id,
            Transaction {
                id: trx_id,
                state: TransactionState::Active,
                isolation: IsolationLevel::RepeatableRead,
                read_view: None,
                start_lsn: 0,
                commit_lsn: None,
            },
        );
        inner.recovered.push(trx_id);
    }

    /// Drain the set of transactions recovery adopted, for the caller
    /// to roll back one by one.
    pub fn drain_recovered(&self) -> Vec<TrxId> {
        std::mem::take(&mut self.inner.lock().unwrap().recovered)
    }

    /// Flush undo updates, write the COMMIT log record through an MTR-
    /// equivalent append+flush, release locks, and garbage-collect the
    /// read view. Reports success only once the COMMIT record's
    /// end-LSN is durably flushed.
    pub fn commit(&self, trx_id: TrxId) -> Result<(), Error> {
        let record = LogRecord {
            space_id: 0,
            page_no: 0,
            body: LogBody::TrxCommit { trx_id },
        };
        let end_marker = LogRecord {
            space_id: 0,
            page_no: 0,
            body: LogBody::MultiRecEnd,
        };
        let (_, end_lsn) = self.log_manager.append(&[record, end_marker])?;
        self.log_manager.flush_to(end_lsn)?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(trx) = inner.active.get_mut(&trx_id) {
            trx.state = TransactionState::CommittedInMemory;
            trx.commit_lsn = Some(end_lsn);
        }
        inner.recently_committed.push(trx_id);
        inner.active.remove(&trx_id);
        // The undo log survives commit: older read views may still need
        // to walk through it to synthesize a visible prior version. It
        // is only dropped once the purge worker decides no view can
        // reach back that far (see `purge_below`).
        drop(inner);

        self.lock_manager.release_all(trx_id);
        info!("committed trx {} at lsn {}", trx_id, end_lsn);
        Ok(())
    }

    /// Walk the undo log newest-first via `apply_inverse`, write an
    /// ABORT marker, and release locks.
    pub fn rollback(
        &self,
        trx_id: TrxId,
        mut apply_inverse: impl FnMut(&undo::UndoRecord) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let records: Vec<undo::UndoRecord> = {
            let mut inner = self.inner.lock().unwrap();
            let log = inner.rollback_segment.open_log(trx_id);
            log.iter_newest_first().cloned().collect()
        };

        for rec in &records {
            apply_inverse(rec)?;
        }

        let record = LogRecord {
            space_id: 0,
            page_no: 0,
            body: LogBody::TrxAbort { trx_id },
        };
        let end_marker = LogRecord {
            space_id: 0,
            page_no: 0,
            body: LogBody::MultiRecEnd,
        };
        let (_, end_lsn) = self.log_manager.append(&[record, end_marker])?;
        self.log_manager.flush_to(end_lsn)?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(trx) = inner.active.get_mut(&trx_id) {
            trx.state = TransactionState::Aborted;
        }
        inner.active.remove(&trx_id);
        inner.rollback_segment.logs.remove(&trx_id);
        drop(inner);

        self.lock_manager.release_all(trx_id);
        info!("rolled back trx {}", trx_id);
        Ok(())
    }

    pub fn is_visible(&self, trx_id: TrxId, candidate: TrxId) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.active.get(&trx_id).and_then(|t| t.read_view.as_ref()) {
            Some(view) => view.is_visible(candidate),
            None => true,
        }
    }

    pub fn oldest_active_low_limit(&self) -> TrxId {
        let inner = self.inner.lock().unwrap();
        inner
            .active
            .values()
            .filter_map(|t| t.read_view.as_ref())
            .map(|v| v.up_limit)
            .min()
            .unwrap_or_else(|| inner.next_trx_id.load(Ordering::SeqCst))
    }

    pub fn active_ids(&self) -> Vec<TrxId> {
        self.inner.lock().unwrap().active.keys().copied().collect()
    }

    /// Fetch a specific undo record by its owning transaction and undo
    /// number, used by MVCC reads walking a record's roll-ptr chain.
    pub fn lookup_undo(&self, trx_id: TrxId, undo_no: u64) -> Option<undo::UndoRecord> {
        let inner = self.inner.lock().unwrap();
        inner.rollback_segment.logs.get(&trx_id)?.get(undo_no).cloned()
    }

    /// Drop undo logs belonging to transactions whose every record is
    /// older than `low_limit` (the oldest active read view's up-limit):
    /// no live snapshot can walk back into them anymore. Called by the
    /// purge worker.
    pub fn purge_below(&self, low_limit: TrxId) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let active_ids: std::collections::HashSet<TrxId> = inner.active.keys().copied().collect();
        let before = inner.rollback_segment.logs.len();
        inner
            .rollback_segment
            .logs
            .retain(|trx_id, _| *trx_id >= low_limit || active_ids.contains(trx_id));
        before - inner.rollback_segment.logs.len()
    }
}
