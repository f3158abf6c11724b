//! Insertion: an optimistic path that writes the modified leaf back in
//! one MTR when it still fits the page, and a pessimistic path that
//! splits bottom-up when it doesn't, recursing into the parent and
//! growing a new root when the split reaches the top of the tree.

use crate::btree::{
    body_len, read_internal, read_leaf, write_internal, write_leaf, BTree, PageBody,
    PAGE_BODY_CAPACITY,
};
use crate::error::Error;
use crate::page::index_page::{Entry, InternalPage, LeafPage};
use crate::page::record::Record;
use crate::storage::buffer_pool::LatchMode;
use crate::types::PageId;

impl<'e> BTree<'e> {
    /// Insert `record` keyed by `record.key()`. Returns `DuplicateKey`
    /// if the key already exists in this index.
    pub fn insert(&self, record: Record) -> Result<(), Error> {
        let path = self.find_path(record.key())?;
        let leaf_id = *path.last().unwrap();
        let mut leaf = read_leaf(self.engine, leaf_id)?;

        if leaf.find(record.key()).is_some() {
            return Err(Error::DuplicateKey);
        }
        leaf.insert_sorted(record);

        if body_len(&PageBody::Leaf(leaf.clone())) <= PAGE_BODY_CAPACITY {
            let mut mtr = self.engine.mtr();
            mtr.get_page(leaf_id, LatchMode::Exclusive)?;
            write_leaf(&mut mtr, leaf_id, &leaf)?;
            mtr.commit()?;
            return Ok(());
        }

        self.split_leaf(&path, leaf)
    }

    /// `leaf` already holds the new record; split it in half, write
    /// both halves, thread the leaf-chain pointers, and push a new
    /// separator entry up into the parent (recursing on overflow there
    /// too).
    fn split_leaf(&self, path: &[PageId], mut leaf: LeafPage) -> Result<(), Error> {
        let leaf_id = *path.last().unwrap();
        let split_at = leaf.records.len() / 2;
        let right_records = leaf.records.split_off(split_at);
        let separator = right_records[0].key().to_vec();

        let right_id = self.allocate_page(leaf_id.space_id)?;
        let mut right = LeafPage::new(self.schema.index_id);
        right.header.level = leaf.header.level;
        right.records = right_records;
        right.header.n_recs = right.records.len() as u16;
        right.next_leaf = leaf.next_leaf;
        right.prev_leaf = Some(leaf_id.page_no);
        leaf.next_leaf = Some(right_id.page_no);
        leaf.header.n_recs = leaf.records.len() as u16;

        let old_right_next = right.next_leaf;

        let mut mtr = self.engine.mtr();
        mtr.get_page(leaf_id, LatchMode::Exclusive)?;
        mtr.new_page(right_id)?;
        write_leaf(&mut mtr, leaf_id, &leaf)?;
        write_leaf(&mut mtr, right_id, &right)?;
        if let Some(next_no) = old_right_next {
            let next_id = PageId::new(leaf_id.space_id, next_no);
            let mut next_page = read_leaf(self.engine, next_id)?;
            next_page.prev_leaf = Some(right_id.page_no);
            mtr.get_page(next_id, LatchMode::Exclusive)?;
            write_leaf(&mut mtr, next_id, &next_page)?;
        }
        mtr.commit()?;

        self.insert_into_parent(path, leaf_id, separator, right_id)
    }

    /// Insert `{separator, right}` into the parent of `left`, splitting
    /// the parent in turn if it overflows, or growing a fresh root if
    /// `left` was the root.
    fn insert_into_parent(
        &self,
        path: &[PageId],
        left: PageId,
        separator: Vec<u8>,
        right: PageId,
    ) -> Result<(), Error> {
        if path.len() == 1 {
            return self.grow_root(left, separator, right);
        }

        let parent_id = path[path.len() - 2];
        let mut parent = read_internal(self.engine, parent_id)?;
        parent.insert_sorted(Entry {
            key: separator,
            child: right.page_no,
        });

        if body_len(&PageBody::Internal(parent.clone())) <= PAGE_BODY_CAPACITY {
            let mut mtr = self.engine.mtr();
            mtr.get_page(parent_id, LatchMode::Exclusive)?;
            write_internal(&mut mtr, parent_id, &parent)?;
            mtr.commit()?;
            return Ok(());
        }

        self.split_internal(&path[..path.len() - 1], parent)
    }

    /// Split an overflowing internal node: the middle entry's key moves
    /// up to the parent as a new separator (it is not duplicated into
    /// either child, matching the standard B+ tree internal-split rule).
    fn split_internal(&self, path: &[PageId], mut node: InternalPage) -> Result<(), Error> {
        let node_id = *path.last().unwrap();
        let mid = node.entries.len() / 2;
        let mut right_entries = node.entries.split_off(mid);
        let up_key = right_entries.remove(0).key;

        let right_id = self.allocate_page(node_id.space_id)?;
        let mut right = InternalPage::new(self.schema.index_id, node.header.level);
        right.entries = right_entries;
        right.header.n_recs = right.entries.len() as u16;
        node.header.n_recs = node.entries.len() as u16;

        let mut mtr = self.engine.mtr();
        mtr.get_page(node_id, LatchMode::Exclusive)?;
        mtr.new_page(right_id)?;
        write_internal(&mut mtr, node_id, &node)?;
        write_internal(&mut mtr, right_id, &right)?;
        mtr.commit()?;

        self.insert_into_parent(path, node_id, up_key, right_id)
    }

    /// The split reached the root: allocate a brand-new internal root
    /// one level higher, point it at both halves, and repoint the
    /// catalog's root-page entry.
    fn grow_root(&self, left: PageId, separator: Vec<u8>, right: PageId) -> Result<(), Error> {
        let old_root_level = match read_internal(self.engine, left) {
            Ok(p) => p.header.level + 1,
            Err(_) => read_leaf(self.engine, left)?.header.level + 1,
        };

        let new_root_id = self.allocate_page(left.space_id)?;
        let mut root = InternalPage::new(self.schema.index_id, old_root_level);
        root.entries.push(Entry {
            key: Vec::new(),
            child: left.page_no,
        });
        root.entries.push(Entry {
            key: separator,
            child: right.page_no,
        });
        root.header.n_recs = root.entries.len() as u16;

        let mut mtr = self.engine.mtr();
        mtr.new_page(new_root_id)?;
        write_internal(&mut mtr, new_root_id, &root)?;
        mtr.commit()?;

        self.engine
            .catalog
            .set_root_page(self.schema.index_id, new_root_id.page_no);
        Ok(())
    }

    fn allocate_page(&self, space_id: crate::types::SpaceId) -> Result<PageId, Error> {
        let page_no = self.engine.allocate_page(space_id)?;
        Ok(PageId::new(space_id, page_no))
    }
}
