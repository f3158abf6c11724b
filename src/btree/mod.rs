//! B+ tree over index pages. Internal nodes store `{key,
//! child-page-no}`; clustered-index leaves store full rows (plus
//! trx-id/roll-ptr); secondary-index leaves store `{key, primary key}`.
//! Leaves are linked prev/next for range scans.

pub mod cursor;
pub mod delete;
pub mod insert;

use crate::catalog::IndexSchema;
use crate::engine::Engine;
use crate::error::Error;
use crate::mtr::Mtr;
use crate::page::index_page::{InternalPage, LeafPage};
use crate::page::record::Record;
use crate::page::{Decodeable, Encodeable};
use crate::storage::buffer_pool::LatchMode;
use crate::types::{PageId, PageNo};

/// Minimum fill factor for non-root pages, per the data model.
pub const MIN_FILL_BYTES: usize = crate::types::PAGE_SIZE / 2;

/// Usable bytes for a page body once header and trailer are subtracted.
pub const PAGE_BODY_CAPACITY: usize =
    crate::types::PAGE_SIZE - crate::page::HEADER_SIZE - crate::page::TRAILER_SIZE;

pub struct BTree<'e> {
    pub engine: &'e Engine,
    pub schema: IndexSchema,
}

#[derive(Clone, Debug)]
pub(crate) enum PageBody {
    Leaf(LeafPage),
    Internal(InternalPage),
}

impl Encodeable for PageBody {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            PageBody::Leaf(p) => {
                0u8.encode(buf);
                p.header.level.encode(buf);
                p.header.index_id.encode(buf);
                p.header.max_trx_id.encode(buf);
                (p.prev_leaf.unwrap_or(u32::MAX)).encode(buf);
                (p.next_leaf.unwrap_or(u32::MAX)).encode(buf);
                (p.records.len() as u32).encode(buf);
                for r in &p.records {
                    r.encode(buf);
                }
            }
            PageBody::Internal(p) => {
                1u8.encode(buf);
                p.header.level.encode(buf);
                p.header.index_id.encode(buf);
                p.header.max_trx_id.encode(buf);
                (p.entries.len() as u32).encode(buf);
                for e in &p.entries {
                    e.key.clone().encode(buf);
                    e.child.encode(buf);
                }
            }
        }
    }
}

impl Decodeable for PageBody {
    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, Error> {
        let tag = u8::decode(buf, pos)?;
        let level = u16::decode(buf, pos)?;
        let index_id = u64::decode(buf, pos)?;
        let max_trx_id = u64::decode(buf, pos)?;
        if tag == 0 {
            let prev = u32::decode(buf, pos)?;
            let next = u32::decode(buf, pos)?;
            let n = u32::decode(buf, pos)? as usize;
            let mut records = Vec::with_capacity(n);
            for _ in 0..n {
                records.push(Record::decode(buf, pos)?);
            }
            let mut page = LeafPage::new(index_id);
            page.header.level = level;
            page.header.max_trx_id = max_trx_id;
            page.prev_leaf = if prev == u32::MAX { None } else { Some(prev) };
            page.next_leaf = if next == u32::MAX { None } else { Some(next) };
            page.records = records;
            page.header.n_recs = page.records.len() as u16;
            Ok(PageBody::Leaf(page))
        } else {
            let n = u32::decode(buf, pos)? as usize;
            let mut entries = Vec::with_capacity(n);
            for _ in 0..n {
                let key = Vec::<u8>::decode(buf, pos)?;
                let child = PageNo::decode(buf, pos)?;
                entries.push(crate::page::index_page::Entry { key, child });
            }
            let mut page = InternalPage::new(index_id, level);
            page.header.max_trx_id = max_trx_id;
            page.entries = entries;
            page.header.n_recs = page.entries.len() as u16;
            Ok(PageBody::Internal(page))
        }
    }
}

pub(crate) fn body_len(body: &PageBody) -> usize {
    let mut buf = Vec::new();
    body.encode(&mut buf);
    buf.len()
}

pub(crate) fn read_page_body(engine: &Engine, id: PageId) -> Result<PageBody, Error> {
    let frame = engine.buffer_pool.get(id, LatchMode::Shared)?;
    let data = frame.data.read().unwrap();
    let mut pos = crate::page::HEADER_SIZE;
    let body = PageBody::decode(&*data, &mut pos)?;
    drop(data);
    engine.buffer_pool.unpin(id);
    Ok(body)
}

pub(crate) fn write_page_body(mtr: &mut Mtr, id: PageId, body: &PageBody) -> Result<(), Error> {
    let mut payload = Vec::new();
    body.encode(&mut payload);
    if payload.len() + crate::page::HEADER_SIZE + crate::page::TRAILER_SIZE > crate::types::PAGE_SIZE {
        return Err(Error::Internal("page overflow: payload exceeds page size".into()));
    }
    mtr.write_bytes(id, crate::page::HEADER_SIZE as u16, &payload)?;
    Ok(())
}

pub(crate) fn read_leaf(engine: &Engine, id: PageId) -> Result<LeafPage, Error> {
    match read_page_body(engine, id)? {
        PageBody::Leaf(p) => Ok(p),
        PageBody::Internal(_) => Err(Error::Internal(format!("{} is not a leaf page", id))),
    }
}

pub(crate) fn read_internal(engine: &Engine, id: PageId) -> Result<InternalPage, Error> {
    match read_page_body(engine, id)? {
        PageBody::Internal(p) => Ok(p),
        PageBody::Leaf(_) => Err(Error::Internal(format!("{} is not an internal page", id))),
    }
}

pub(crate) fn write_leaf(mtr: &mut Mtr, id: PageId, page: &LeafPage) -> Result<(), Error> {
    write_page_body(mtr, id, &PageBody::Leaf(page.clone()))
}

pub(crate) fn write_internal(mtr: &mut Mtr, id: PageId, page: &InternalPage) -> Result<(), Error> {
    write_page_body(mtr, id, &PageBody::Internal(page.clone()))
}

impl<'e> BTree<'e> {
    pub fn new(engine: &'e Engine, schema: IndexSchema) -> Self {
        Self { engine, schema }
    }

    /// Write an empty leaf page at `schema.root_page`, the state every
    /// freshly-created index starts from. Callers creating a table are
    /// expected to allocate the root page number and register the
    /// schema with the catalog before calling this.
    pub fn init_leaf_root(engine: &Engine, schema: &IndexSchema) -> Result<(), Error> {
        let id = PageId::new(schema.space_id, schema.root_page);
        let page = LeafPage::new(schema.index_id);
        let mut mtr = engine.mtr();
        mtr.new_page(id)?;
        write_leaf(&mut mtr, id, &page)?;
        mtr.commit()?;
        Ok(())
    }

    fn root_id(&self) -> PageId {
        PageId::new(self.schema.space_id, self.schema.root_page)
    }

    /// Latch-couple from the root down to the leaf that would contain
    /// `key`: acquire the child before releasing the parent (read-only
    /// search never needs to hold more than one page in this in-memory
    /// walk since each `read_*` call releases its latch on return).
    pub fn find_leaf(&self, key: &[u8]) -> Result<PageId, Error> {
        let mut current = self.root_id();
        loop {
            let page = read_page_body(self.engine, current)?;
            match page {
                PageBody::Leaf(_) => return Ok(current),
                PageBody::Internal(internal) => {
                    let child = internal.child_for(key);
                    current = PageId::new(self.schema.space_id, child);
                }
            }
        }
    }

    pub fn search(&self, key: &[u8]) -> Result<Option<Record>, Error> {
        let leaf_id = self.find_leaf(key)?;
        let leaf = read_leaf(self.engine, leaf_id)?;
        Ok(leaf.find(key).cloned())
    }

    /// Full left-to-right range scan via leaf-sibling pointers,
    /// latching siblings left-to-right to avoid deadlocking with
    /// concurrent structural changes.
    pub fn scan_all(&self) -> Result<Vec<Record>, Error> {
        let mut current = self.find_leaf(&[])?;
        let mut out = Vec::new();
        loop {
            let leaf = read_leaf(self.engine, current)?;
            out.extend(leaf.records.iter().filter(|r| !r.is_deleted()).cloned());
            match leaf.next_leaf {
                Some(next) => current = PageId::new(self.schema.space_id, next),
                None => break,
            }
        }
        Ok(out)
    }

    /// Root-to-leaf path of page ids, kept around by split/merge so a
    /// structural change can walk back up without re-searching.
    pub(crate) fn find_path(&self, key: &[u8]) -> Result<Vec<PageId>, Error> {
        let mut path = vec![self.root_id()];
        loop {
            let current = *path.last().unwrap();
            match read_page_body(self.engine, current)? {
                PageBody::Leaf(_) => return Ok(path),
                PageBody::Internal(internal) => {
                    let child = internal.child_for(key);
                    path.push(PageId::new(self.schema.space_id, child));
                }
            }
        }
    }

    pub fn height(&self) -> Result<usize, Error> {
        let mut current = self.root_id();
        let mut h = 1;
        loop {
            match read_page_body(self.engine, current)? {
                PageBody::Leaf(_) => return Ok(h),
                PageBody::Internal(internal) => {
                    h += 1;
                    current = PageId::new(self.schema.space_id, internal.entries[0].child);
                }
            }
        }
    }
}

