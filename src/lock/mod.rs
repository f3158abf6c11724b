//! Lock manager: table locks in `{IS, IX, S, X}` and record locks on
//! individual `(space, page, heap-no)` slots, with gap/next-key/
//! insert-intention variants and waits-for-graph deadlock detection.

pub mod wait_for_graph;

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use log::{debug, warn};

use crate::config::EngineConfig;
use crate::error::Error;
use crate::types::{HeapNo, PageId, TrxId};

use wait_for_graph::WaitForGraph;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum TableLockMode {
    IS,
    IX,
    S,
    X,
}

impl TableLockMode {
    /// Compatibility matrix from the lock manager's spec: rows = held,
    /// cols = requested.
    pub fn compatible_with(self, other: TableLockMode) -> bool {
        use TableLockMode::*;
        !matches!(
            (self, other),
            (IS, X)
                | (IX, S)
                | (IX, X)
                | (S, IX)
                | (S, X)
                | (X, IS)
                | (X, IX)
                | (X, S)
                | (X, X)
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum RecordLockVariant {
    /// Locks only the record itself.
    RecNotGap,
    /// Locks the open interval to the left of the record.
    Gap,
    /// Record + left gap; default for REPEATABLE_READ.
    NextKey,
    /// A gap lock signalling intent to insert.
    InsertIntention,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct RecordLockMode {
    pub exclusive: bool,
    pub variant: RecordLockVariant,
}

impl RecordLockMode {
    /// Two locks conflict only if they cover a common object (the gap,
    /// the record, or both via `NextKey`) and at least one is
    /// exclusive. `InsertIntention` covers the gap only, never the
    /// record itself, so it never conflicts with a plain `RecNotGap`
    /// lock — only with something that also covers the gap.
    pub fn conflicts_with(self, other: RecordLockMode) -> bool {
        use RecordLockVariant::*;
        if self.variant == InsertIntention && other.variant == InsertIntention {
            return false;
        }
        let covers_gap = |v: RecordLockVariant| matches!(v, Gap | NextKey | InsertIntention);
        let covers_rec = |v: RecordLockVariant| matches!(v, RecNotGap | NextKey);

        let shared_object =
            (covers_gap(self.variant) && covers_gap(other.variant))
                || (covers_rec(self.variant) && covers_rec(other.variant));
        if !shared_object {
            return false;
        }
        self.exclusive || other.exclusive
    }
}

#[derive(Clone, Copy, Debug)]
struct TableLockEntry {
    trx: TrxId,
    mode: TableLockMode,
    granted: bool,
}

#[derive(Clone, Copy, Debug)]
struct RecordLockEntry {
    trx: TrxId,
    heap_no: HeapNo,
    mode: RecordLockMode,
    granted: bool,
}

struct Inner {
    table_locks: HashMap<u64, Vec<TableLockEntry>>,
    record_locks: HashMap<PageId, Vec<RecordLockEntry>>,
    wait_for: WaitForGraph,
    /// Rough "weight" used to pick a deadlock victim: smaller undo log
    /// footprint is preferred. Approximated here by counting locks
    /// held; a fresh transaction with fewer locks is cheaper to abort.
    weight: HashMap<TrxId, usize>,
}

pub struct LockManager {
    inner: Mutex<Inner>,
    cond: Condvar,
    timeout: std::time::Duration,
    search_depth: usize,
}

impl LockManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                table_locks: HashMap::new(),
                record_locks: HashMap::new(),
                wait_for: WaitForGraph::new(),
                weight: HashMap::new(),
            }),
            cond: Condvar::new(),
            timeout: config.lock_wait_timeout,
            search_depth: config.deadlock_search_depth,
        }
    }

    pub fn acquire_table_lock(&self, trx: TrxId, table_id: u64, mode: TableLockMode) -> Result<(), Error> {
        let deadline = Instant::now() + self.timeout;
        let mut inner = self.inner.lock().unwrap();

        loop {
            let entries = inner.table_locks.entry(table_id).or_insert_with(Vec::new);
            if let Some(e) = entries.iter().find(|e| e.trx == trx && e.mode == mode) {
                if e.granted {
                    return Ok(());
                }
            }

            let conflict = entries
                .iter()
                .any(|e| e.granted && e.trx != trx && !e.mode.compatible_with(mode));

            if !conflict {
                entries.push(TableLockEntry {
                    trx,
                    mode,
                    granted: true,
                });
                *inner.weight.entry(trx).or_insert(0) += 1;
                inner.wait_for.remove_waiter(trx);
                return Ok(());
            }

            // Register wait-for edges against every incompatible holder.
            let holders: Vec<TrxId> = entries
                .iter()
                .filter(|e| e.granted && e.trx != trx && !e.mode.compatible_with(mode))
                .map(|e| e.trx)
                .collect();
            for holder in &holders {
                inner.wait_for.add_edge(trx, *holder);
            }

            if let Some(cycle) = inner.wait_for.find_cycle(trx, self.search_depth) {
                let victim = self.choose_victim(&inner, &cycle);
                debug!("deadlock detected: {:?}, victim = {}", cycle, victim);
                inner.wait_for.remove_waiter(trx);
                if victim == trx {
                    return Err(Error::Deadlock(trx));
                }
                // The other party is the victim; it will observe the
                // deadlock on its own next check. We proceed to wait.
            }

            if Instant::now() >= deadline {
                inner.wait_for.remove_waiter(trx);
                return Err(Error::LockWaitTimeout(self.timeout));
            }

            let (guard, timeout_result) = self
                .cond
                .wait_timeout(inner, deadline.saturating_duration_since(Instant::now()))
                .unwrap();
            inner = guard;
            if timeout_result.timed_out() && Instant::now() >= deadline {
                inner.wait_for.remove_waiter(trx);
                return Err(Error::LockWaitTimeout(self.timeout));
            }
        }
    }

    pub fn acquire_record_lock(
        &self,
        trx: TrxId,
        page: PageId,
        heap_no: HeapNo,
        mode: RecordLockMode,
    ) -> Result<(), Error> {
        let deadline = Instant::now() + self.timeout;
        let mut inner = self.inner.lock().unwrap();

        loop {
            let entries = inner.record_locks.entry(page).or_insert_with(Vec::new);
            if entries
                .iter()
                .any(|e| e.trx == trx && e.heap_no == heap_no && e.mode == mode && e.granted)
            {
                return Ok(());
            }

            let conflict = entries.iter().any(|e| {
                e.granted && e.trx != trx && e.heap_no == heap_no && e.mode.conflicts_with(mode)
            });

            if !conflict {
                entries.push(RecordLockEntry {
                    trx,
                    heap_no,
                    mode,
                    granted: true,
                });
                *inner.weight.entry(trx).or_insert(0) += 1;
                inner.wait_for.remove_waiter(trx);
                return Ok(());
            }

            let holders: Vec<TrxId> = entries
                .iter()
                .filter(|e| {
                    e.granted && e.trx != trx && e.heap_no == heap_no && e.mode.conflicts_with(mode)
                })
                .map(|e| e.trx)
                .collect();
            for holder in &holders {
                inner.wait_for.add_edge(trx, *holder);
            }

            if let Some(cycle) = inner.wait_for.find_cycle(trx, self.search_depth) {
                let victim = self.choose_victim(&inner, &cycle);
                debug!("deadlock detected: {:?}, victim = {}", cycle, victim);
                inner.wait_for.remove_waiter(trx);
                if victim == trx {
                    return Err(Error::Deadlock(trx));
                }
            }

            if Instant::now() >= deadline {
                inner.wait_for.remove_waiter(trx);
                return Err(Error::LockWaitTimeout(self.timeout));
            }

            let (guard, timeout_result) = self
                .cond
                .wait_timeout(inner, deadline.saturating_duration_since(Instant::now()))
                .unwrap();
            inner = guard;
            if timeout_result.timed_out() && Instant::now() >= deadline {
                inner.wait_for.remove_waiter(trx);
                return Err(Error::LockWaitTimeout(self.timeout));
            }
        }
    }

    fn choose_victim(&self, inner: &Inner, cycle: &[TrxId]) -> TrxId {
        cycle
            .iter()
            .copied()
            .min_by_key(|t| inner.weight.get(t).copied().unwrap_or(0))
            .unwrap_or(cycle[0])
    }

    /// Release every lock held by `trx` (on commit or rollback) and
    /// wake waiters so they can re-evaluate in FIFO order.
    pub fn release_all(&self, trx: TrxId) {
        let mut inner = self.inner.lock().unwrap();
        for entries in inner.table_locks.values_mut() {
            entries.retain(|e| e.trx != trx);
        }
        for entries in inner.record_locks.values_mut() {
            entries.retain(|e| e.trx != trx);
        }
        inner.wait_for.remove_waiter(trx);
        inner.weight.remove(&trx);
        drop(inner);
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lock_compatibility_matrix() {
        use TableLockMode::*;
        assert!(IS.compatible_with(IS));
        assert!(IS.compatible_with(IX));
        assert!(IS.compatible_with(S));
        assert!(!IS.compatible_with(X));
        assert!(IX.compatible_with(IX));
        assert!(!IX.compatible_with(S));
        assert!(!X.compatible_with(X));
    }

    #[test]
    fn gap_locks_do_not_conflict_with_each_other() {
        let a = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::Gap,
        };
        let b = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::Gap,
        };
        assert!(!a.conflicts_with(b));
    }

    #[test]
    fn insert_intention_conflicts_with_gap() {
        let gap = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::Gap,
        };
        let ii = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::InsertIntention,
        };
        assert!(gap.conflicts_with(ii));
    }

    #[test]
    fn two_insert_intentions_never_conflict() {
        let ii1 = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::InsertIntention,
        };
        let ii2 = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::InsertIntention,
        };
        assert!(!ii1.conflicts_with(ii2));
    }

    #[test]
    fn insert_intention_does_not_conflict_with_record_only_lock() {
        let rec = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::RecNotGap,
        };
        let ii = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::InsertIntention,
        };
        assert!(!rec.conflicts_with(ii));
        assert!(!ii.conflicts_with(rec));
    }

    #[test]
    fn insert_intention_conflicts_with_next_key() {
        let nk = RecordLockMode {
            exclusive: false,
            variant: RecordLockVariant::NextKey,
        };
        let ii = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::InsertIntention,
        };
        assert!(nk.conflicts_with(ii));
    }

    #[test]
    fn record_only_and_gap_only_locks_cover_disjoint_objects() {
        let rec = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::RecNotGap,
        };
        let gap = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::Gap,
        };
        assert!(!rec.conflicts_with(gap));
    }

    #[test]
    fn two_exclusive_record_locks_conflict() {
        let a = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::RecNotGap,
        };
        let b = RecordLockMode {
            exclusive: true,
            variant: RecordLockVariant::RecNotGap,
        };
        assert!(a.conflicts_with(b));
    }
}
