//! Mini-transaction (MTR): a short-lived, single-thread bracket around
//! a group of page modifications that must become durable all-or-
//! nothing. Accumulates a redo buffer and a pin list; `commit` appends
//! the group to the log, stamps page LSNs, and releases latches.

use std::sync::Arc;

use log::warn;

use crate::error::Error;
use crate::log::record::{LogBody, LogRecord};
use crate::page::{self, PageHeader};
use crate::storage::buffer_pool::{Frame, LatchMode};
use crate::types::{Lsn, PageId};
use crate::utils::HandyRwLock;

pub struct Mtr<'e> {
    engine: &'e crate::engine::Engine,
    pinned: Vec<(PageId, Arc<Frame>)>,
    redo: Vec<LogRecord>,
    committed: bool,
}

impl<'e> Mtr<'e> {
    pub fn start(engine: &'e crate::engine::Engine) -> Self {
        Self {
            engine,
            pinned: Vec::new(),
            redo: Vec::new(),
            committed: false,
        }
    }

    pub fn get_page(&mut self, id: PageId, mode: LatchMode) -> Result<Arc<Frame>, Error> {
        if let Some((_, f)) = self.pinned.iter().find(|(pid, _)| *pid == id) {
            return Ok(f.clone());
        }
        let frame = self.engine.buffer_pool.get(id, mode)?;
        self.pinned.push((id, frame.clone()));
        Ok(frame)
    }

    pub fn new_page(&mut self, id: PageId) -> Result<Arc<Frame>, Error> {
        let frame = self.engine.buffer_pool.new_page(id)?;
        self.pinned.push((id, frame.clone()));
        Ok(frame)
    }

    /// Mutate `len` bytes at `offset` on `id`'s frame, coalescing with
    /// any prior write to the same page in this MTR only in the sense
    /// that both end up in the same committed group.
    pub fn write_bytes(&mut self, id: PageId, offset: u16, bytes: &[u8]) -> Result<(), Error> {
        let frame = self
            .pinned
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, f)| f.clone())
            .ok_or_else(|| Error::Internal("write_bytes on unpinned page".into()))?;

        {
            let mut data = frame.data.wl();
            let start = offset as usize;
            data[start..start + bytes.len()].copy_from_slice(bytes);
        }

        self.redo.push(LogRecord {
            space_id: id.space_id,
            page_no: id.page_no,
            body: LogBody::WriteBytes {
                offset,
                bytes: bytes.to_vec(),
            },
        });
        Ok(())
    }

    pub fn log_insert(&mut self, id: PageId, heap_no: u16, record_bytes: Vec<u8>) {
        self.redo.push(LogRecord {
            space_id: id.space_id,
            page_no: id.page_no,
            body: LogBody::RecInsert {
                heap_no,
                record: record_bytes,
            },
        });
    }

    pub fn log_delete(&mut self, id: PageId, heap_no: u16) {
        self.redo.push(LogRecord {
            space_id: id.space_id,
            page_no: id.page_no,
            body: LogBody::RecDelete { heap_no },
        });
    }

    /// 1. Append an end-of-mtr marker if the buffer is non-empty.
    /// 2. Copy the buffer to the global log under the log latch,
    ///    obtaining `(start_lsn, end_lsn)`.
    /// 3. Stamp `end_lsn` into every modified page's header/trailer and
    ///    insert into the flush list keyed by `start_lsn` if not
    ///    already dirty.
    /// 4. Release all latches (pins) in reverse order.
    pub fn commit(mut self) -> Result<Lsn, Error> {
        if self.redo.is_empty() {
            self.committed = true;
            return Ok(self.engine.log_manager.write_lsn());
        }

        self.redo.push(LogRecord {
            space_id: 0,
            page_no: 0,
            body: LogBody::MultiRecEnd,
        });

        let (start_lsn, end_lsn) = self.engine.log_manager.append(&self.redo)?;

        let touched: std::collections::HashSet<PageId> = self
            .redo
            .iter()
            .filter(|r| !r.is_multi_rec_end())
            .map(|r| PageId::new(r.space_id, r.page_no))
            .collect();

        for id in &touched {
            if let Some((_, frame)) = self.pinned.iter().find(|(pid, _)| pid == id) {
                let mut data = frame.data.wl();
                if let Ok(mut header) = PageHeader::read_from(&*data) {
                    header.lsn = end_lsn;
                    header.write_to(&mut *data);
                } else {
                    // fresh page: give it a minimal valid header before stamping.
                    let mut header = PageHeader::new(*id, crate::page::PageType::Index);
                    header.lsn = end_lsn;
                    header.write_to(&mut *data);
                }
                page::stamp_trailer(&mut *data, end_lsn);
                drop(data);
                self.engine.buffer_pool.mark_dirty(*id, start_lsn);
            }
        }

        self.committed = true;
        Ok(end_lsn)
    }
}

impl<'e> Drop for Mtr<'e> {
    fn drop(&mut self) {
        if !self.committed {
            warn!("mtr dropped without commit; pinned pages remain pinned until unpin");
        }
        for (id, _) in self.pinned.drain(..).collect::<Vec<_>>() {
            self.engine.buffer_pool.unpin(id);
        }
    }
}
