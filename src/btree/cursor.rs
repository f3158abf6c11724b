//! A persistent cursor: a bookmark onto a leaf page and a position
//! within it that survives across calls, validated against the page's
//! LSN each time it is dereferenced so a concurrent split/merge can't
//! hand back a stale slot.

use crate::btree::{read_leaf, BTree};
use crate::error::Error;
use crate::page::record::Record;
use crate::types::PageId;

/// Where the cursor sits relative to its bookmarked key: still on the
/// page it last searched, or needing to re-descend from the root.
#[derive(Clone, Debug)]
pub struct Cursor<'e, 't> {
    tree: &'t BTree<'e>,
    page_id: PageId,
    /// The key last positioned on; `None` means the cursor sits before
    /// the first record (a fresh `first()`).
    key: Option<Vec<u8>>,
    /// Page header LSN observed the last time this cursor read its
    /// page, used to detect that the page changed under us.
    seen_lsn: u64,
}

impl<'e, 't> Cursor<'e, 't> {
    pub fn seek(tree: &'t BTree<'e>, key: &[u8]) -> Result<Self, Error> {
        let page_id = tree.find_leaf(key)?;
        let seen_lsn = Self::page_lsn(tree, page_id)?;
        Ok(Self {
            tree,
            page_id,
            key: Some(key.to_vec()),
            seen_lsn,
        })
    }

    pub fn first(tree: &'t BTree<'e>) -> Result<Self, Error> {
        let page_id = tree.find_leaf(&[])?;
        let seen_lsn = Self::page_lsn(tree, page_id)?;
        Ok(Self {
            tree,
            page_id,
            key: None,
            seen_lsn,
        })
    }

    fn page_lsn(tree: &BTree, page_id: PageId) -> Result<u64, Error> {
        let frame = tree.engine.buffer_pool.get(page_id, crate::storage::buffer_pool::LatchMode::Shared)?;
        let data = frame.data.read().unwrap();
        let lsn = crate::page::PageHeader::read_from(&*data).map(|h| h.lsn).unwrap_or(0);
        drop(data);
        tree.engine.buffer_pool.unpin(page_id);
        Ok(lsn)
    }

    /// Re-validate the bookmark: if the page's LSN moved since we last
    /// looked (a split, merge, or purge touched it), re-descend from
    /// the root using the bookmarked key rather than trusting the
    /// cached page id.
    fn restore_if_stale(&mut self) -> Result<(), Error> {
        let current_lsn = Self::page_lsn(self.tree, self.page_id)?;
        if current_lsn == self.seen_lsn {
            return Ok(());
        }
        let key = self.key.clone().unwrap_or_default();
        self.page_id = self.tree.find_leaf(&key)?;
        self.seen_lsn = Self::page_lsn(self.tree, self.page_id)?;
        Ok(())
    }

    /// Current record at the bookmark, or `None` if it was deleted and
    /// purged out from under the cursor.
    pub fn current(&mut self) -> Result<Option<Record>, Error> {
        self.restore_if_stale()?;
        let page = read_leaf(self.tree.engine, self.page_id)?;
        match &self.key {
            Some(k) => Ok(page.find(k).cloned()),
            None => Ok(page.records.first().cloned()),
        }
    }

    /// Advance to the next record in key order, following the leaf
    /// chain when the current page is exhausted.
    pub fn advance(&mut self) -> Result<Option<Record>, Error> {
        self.restore_if_stale()?;
        let page = read_leaf(self.tree.engine, self.page_id)?;
        let idx = match &self.key {
            Some(k) => page.lower_bound(k),
            None => 0,
        };
        let next_idx = match &self.key {
            Some(_) if idx < page.records.len() && page.records[idx].key() == self.key.as_deref().unwrap_or(&[]) => idx + 1,
            _ => idx,
        };
        if let Some(rec) = page.records.get(next_idx) {
            self.key = Some(rec.key().to_vec());
            return Ok(Some(rec.clone()));
        }
        match page.next_leaf {
            Some(next_no) => {
                self.page_id = PageId::new(self.page_id.space_id, next_no);
                self.seen_lsn = Self::page_lsn(self.tree, self.page_id)?;
                let next_page = read_leaf(self.tree.engine, self.page_id)?;
                match next_page.records.first() {
                    Some(rec) => {
                        self.key = Some(rec.key().to_vec());
                        Ok(Some(rec.clone()))
                    }
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    pub fn leaf_page_id(&self) -> PageId {
        self.page_id
    }
}
