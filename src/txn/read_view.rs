//! MVCC read views: a snapshot of which transaction ids are visible,
//! captured once (REPEATABLE_READ/SERIALIZABLE) or per-statement
//! (READ_COMMITTED).

use crate::types::TrxId;

#[derive(Clone, Debug)]
pub struct ReadView {
    /// Smallest trx-id not yet assigned at view creation time.
    pub low_limit: TrxId,
    /// Smallest still-active trx-id at view creation time.
    pub up_limit: TrxId,
    /// Ids active (uncommitted) at view-creation time, sorted.
    pub active_ids: Vec<TrxId>,
    pub creator_id: TrxId,
}

impl ReadView {
    pub fn new(creator_id: TrxId, active_ids: Vec<TrxId>, next_trx_id: TrxId) -> Self {
        let mut active_ids = active_ids;
        active_ids.sort_unstable();
        let up_limit = active_ids.first().copied().unwrap_or(next_trx_id);
        Self {
            low_limit: next_trx_id,
            up_limit,
            active_ids,
            creator_id,
        }
    }

    /// A record version `v` is visible under this view iff:
    /// `v.trx_id < up_limit`, OR `v.trx_id == creator_id`, OR
    /// `v.trx_id` was not active at snapshot time (and is `< low_limit`).
    pub fn is_visible(&self, trx_id: TrxId) -> bool {
        if trx_id == self.creator_id {
            return true;
        }
        if trx_id < self.up_limit {
            return true;
        }
        if trx_id >= self.low_limit {
            return false;
        }
        !self.active_ids.binary_search(&trx_id).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sees_own_writes() {
        let view = ReadView::new(5, vec![3, 5, 7], 10);
        assert!(view.is_visible(5));
    }

    #[test]
    fn does_not_see_concurrently_active() {
        let view = ReadView::new(5, vec![3, 5, 7], 10);
        assert!(!view.is_visible(7));
    }

    #[test]
    fn sees_old_committed() {
        let view = ReadView::new(5, vec![3, 5, 7], 10);
        assert!(view.is_visible(1));
    }

    #[test]
    fn does_not_see_future() {
        let view = ReadView::new(5, vec![3, 5, 7], 10);
        assert!(!view.is_visible(11));
    }
}
