//! Page store: a pool of fixed-size in-memory frames backed by
//! tablespace files, with an LRU (young head / old tail, scan
//! resistant), a free list, a flush list ordered by oldest-mod-LSN,
//! and a page hash from `(space, page-no)` to frame.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use log::{debug, warn};

use crate::config::EngineConfig;
use crate::error::Error;
use crate::page::{self, PageHeader};
use crate::storage::space::Tablespace;
use crate::types::{Lsn, PageId, PAGE_SIZE};
use crate::utils::HandyRwLock;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LatchMode {
    Shared,
    Exclusive,
    NoLatch,
}

/// One buffer-pool frame: the page bytes behind their own latch (so a
/// holder may keep it across an MTR without pinning the whole pool),
/// plus the bookkeeping the pool needs to place it in LRU/flush lists.
pub struct Frame {
    pub page_id: PageId,
    pub data: RwLock<[u8; PAGE_SIZE]>,
    pub fix_count: AtomicUsize,
    /// Set when the page was modified but not yet flushed; holds the
    /// LSN at which it *first* became dirty since the last flush.
    pub oldest_mod_lsn: Mutex<Option<Lsn>>,
    pub last_touch: Mutex<Instant>,
    pub entered_old_at: Mutex<Option<Instant>>,
}

impl Frame {
    fn new(page_id: PageId, data: [u8; PAGE_SIZE]) -> Self {
        Self {
            page_id,
            data: RwLock::new(data),
            fix_count: AtomicUsize::new(0),
            oldest_mod_lsn: Mutex::new(None),
            last_touch: Mutex::new(Instant::now()),
            entered_old_at: Mutex::new(None),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.oldest_mod_lsn.lock().unwrap().is_some()
    }
}

/// Where a frame lives in the LRU; kept separately from the frame
/// itself so the list can be reordered without touching page bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LruSublist {
    Young,
    Old,
}

struct LruEntry {
    frame_idx: usize,
    sublist: LruSublist,
}

struct Inner {
    frames: Vec<Option<Arc<Frame>>>,
    hash: HashMap<PageId, usize>,
    free: Vec<usize>,
    /// Front = young head, back = old tail; eviction scans from the back.
    lru: VecDeque<LruEntry>,
    /// Page ids currently dirty, kept in roughly flush-list order
    /// (oldest-mod-LSN ascending) by re-sorting on insert; small pools
    /// make this cheap enough.
    flush_list: Vec<PageId>,
}

pub struct BufferPool {
    inner: Mutex<Inner>,
    pub spaces: Mutex<HashMap<crate::types::SpaceId, Tablespace>>,
    capacity: usize,
    old_ratio: f64,
    old_dwell: std::time::Duration,
    reads: AtomicU32,
    writes: AtomicU32,
    evictions: AtomicU32,
}

impl BufferPool {
    pub fn new(config: &EngineConfig) -> Self {
        let mut frames = Vec::with_capacity(config.buffer_pool_frames);
        let mut free = Vec::with_capacity(config.buffer_pool_frames);
        for i in 0..config.buffer_pool_frames {
            frames.push(None);
            free.push(i);
        }

        Self {
            inner: Mutex::new(Inner {
                frames,
                hash: HashMap::new(),
                free,
                lru: VecDeque::new(),
                flush_list: Vec::new(),
            }),
            spaces: Mutex::new(HashMap::new()),
            capacity: config.buffer_pool_frames,
            old_ratio: config.lru_old_ratio,
            old_dwell: config.old_page_dwell,
            reads: AtomicU32::new(0),
            writes: AtomicU32::new(0),
            evictions: AtomicU32::new(0),
        }
    }

    pub fn register_space(&self, space: Tablespace) {
        self.spaces.wl().insert(space.space_id, space);
    }

    /// Get-page protocol: hash lookup, pin, fault in on miss, verify,
    /// and place correctly in the LRU with scan resistance.
    pub fn get(&self, id: PageId, _mode: LatchMode) -> Result<Arc<Frame>, Error> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(&idx) = inner.hash.get(&id) {
                let frame = inner.frames[idx].clone().unwrap();
                frame.fix_count.fetch_add(1, Ordering::SeqCst);
                self.touch(&mut inner, idx);
                return Ok(frame);
            }
        }

        // Miss: fault the page in from its tablespace.
        let mut buf = [0u8; PAGE_SIZE];
        {
            let mut spaces = self.spaces.wl();
            let space = spaces
                .get_mut(&id.space_id)
                .ok_or_else(|| Error::InvalidInput(format!("unknown space {}", id.space_id)))?;
            space.read_page(id.page_no, &mut buf)?;
        }
        self.reads.fetch_add(1, Ordering::Relaxed);

        // Page 0 of an otherwise all-zero fresh tablespace has no valid
        // header yet; callers creating new pages go through `allocate`
        // instead, so any page reaching here should already carry one.
        if buf.iter().any(|&b| b != 0) {
            page::verify_page(id, &buf)?;
        }

        let frame = Arc::new(Frame::new(id, buf));

        let mut inner = self.inner.lock().unwrap();
        let idx = match inner.free.pop() {
            Some(idx) => idx,
            None => self.evict(&mut inner)?,
        };
        inner.frames[idx] = Some(frame.clone());
        inner.hash.insert(id, idx);
        frame.fix_count.fetch_add(1, Ordering::SeqCst);
        self.insert_at_midpoint(&mut inner, idx);

        Ok(frame)
    }

    /// Allocate a brand-new, all-zero page directly into the pool
    /// (used when the B+ tree grows a new leaf/internal/root page).
    pub fn new_page(&self, id: PageId) -> Result<Arc<Frame>, Error> {
        let frame = Arc::new(Frame::new(id, [0u8; PAGE_SIZE]));
        let mut inner = self.inner.lock().unwrap();
        let idx = match inner.free.pop() {
            Some(idx) => idx,
            None => self.evict(&mut inner)?,
        };
        inner.frames[idx] = Some(frame.clone());
        inner.hash.insert(id, idx);
        frame.fix_count.fetch_add(1, Ordering::SeqCst);
        self.insert_at_midpoint(&mut inner, idx);
        Ok(frame)
    }

    pub fn unpin(&self, id: PageId) {
        let inner = self.inner.lock().unwrap();
        if let Some(&idx) = inner.hash.get(&id) {
            if let Some(frame) = &inner.frames[idx] {
                frame.fix_count.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Mark a page dirty as of `lsn`, inserting it into the flush list
    /// keyed by its *first*-dirty LSN if not already present. Only
    /// valid while the caller holds the page's X-latch through an MTR.
    pub fn mark_dirty(&self, id: PageId, lsn: Lsn) {
        let inner = self.inner.lock().unwrap();
        if let Some(&idx) = inner.hash.get(&id) {
            if let Some(frame) = &inner.frames[idx] {
                let mut oldest = frame.oldest_mod_lsn.lock().unwrap();
                if oldest.is_none() {
                    *oldest = Some(lsn);
                    drop(oldest);
                    drop(inner);
                    let mut inner = self.inner.lock().unwrap();
                    inner.flush_list.push(id);
                    inner
                        .flush_list
                        .sort_by_key(|pid| self.oldest_mod_lsn_of(&inner, *pid));
                }
            }
        }
    }

    fn oldest_mod_lsn_of(&self, inner: &Inner, id: PageId) -> Lsn {
        inner
            .hash
            .get(&id)
            .and_then(|&idx| inner.frames[idx].as_ref())
            .and_then(|f| *f.oldest_mod_lsn.lock().unwrap())
            .unwrap_or(u64::MAX)
    }

    /// Flush dirty pages with oldest-mod-LSN <= `up_to`, enforcing WAL
    /// by calling `flush_to` on the log before each write.
    pub fn flush_up_to(
        &self,
        up_to: Lsn,
        mut flush_to_log: impl FnMut(Lsn) -> Result<(), Error>,
    ) -> Result<usize, Error> {
        let candidates: Vec<PageId> = {
            let inner = self.inner.lock().unwrap();
            inner
                .flush_list
                .iter()
                .filter(|&&id| self.oldest_mod_lsn_of(&inner, id) <= up_to)
                .cloned()
                .collect()
        };

        let mut flushed = 0;
        for id in candidates {
            let frame = {
                let inner = self.inner.lock().unwrap();
                inner
                    .hash
                    .get(&id)
                    .and_then(|&idx| inner.frames[idx].clone())
            };
            let Some(frame) = frame else { continue };

            let page_lsn = {
                let data = frame.data.rl();
                PageHeader::read_from(&*data).map(|h| h.lsn).unwrap_or(0)
            };
            flush_to_log(page_lsn)?;

            {
                let mut spaces = self.spaces.wl();
                if let Some(space) = spaces.get_mut(&id.space_id) {
                    let data = frame.data.rl();
                    space.write_page(id.page_no, &*data)?;
                }
            }
            self.writes.fetch_add(1, Ordering::Relaxed);

            *frame.oldest_mod_lsn.lock().unwrap() = None;
            let mut inner = self.inner.lock().unwrap();
            inner.flush_list.retain(|&pid| pid != id);
            flushed += 1;
        }
        Ok(flushed)
    }

    pub fn oldest_dirty_lsn(&self) -> Option<Lsn> {
        let inner = self.inner.lock().unwrap();
        inner
            .flush_list
            .first()
            .map(|&id| self.oldest_mod_lsn_of(&inner, id))
    }

    fn touch(&self, inner: &mut Inner, idx: usize) {
        let pos = inner.lru.iter().position(|e| e.frame_idx == idx);
        let Some(pos) = pos else { return };
        let entry = &inner.lru[pos];
        if entry.sublist == LruSublist::Old {
            let frame = inner.frames[idx].as_ref().unwrap();
            let entered = *frame.entered_old_at.lock().unwrap();
            let promote = match entered {
                Some(t) => t.elapsed() >= self.old_dwell,
                None => true,
            };
            if promote {
                let mut e = inner.lru.remove(pos).unwrap();
                e.sublist = LruSublist::Young;
                inner.lru.push_front(e);
                *frame.entered_old_at.lock().unwrap() = None;
                debug!("promoted frame {} from old to young (scan resistance)", idx);
            }
        }
        if let Some(frame) = inner.frames[idx].as_ref() {
            *frame.last_touch.lock().unwrap() = Instant::now();
        }
    }

    fn insert_at_midpoint(&self, inner: &mut Inner, idx: usize) {
        let old_count = (inner.lru.len() as f64 * self.old_ratio).round() as usize;
        let split = inner.lru.len().saturating_sub(old_count);
        inner.lru.insert(
            split,
            LruEntry {
                frame_idx: idx,
                sublist: LruSublist::Old,
            },
        );
        if let Some(frame) = inner.frames[idx].as_ref() {
            *frame.entered_old_at.lock().unwrap() = Some(Instant::now());
        }
    }

    /// Evict the first unfixed, clean page found scanning from the LRU
    /// tail. Dirty victims are skipped here; a real deployment would
    /// request a flush and retry, but callers of `get` always see a
    /// populated flush list keep the pool non-saturated in practice.
    fn evict(&self, inner: &mut Inner) -> Result<usize, Error> {
        for pos in (0..inner.lru.len()).rev() {
            let idx = inner.lru[pos].frame_idx;
            let frame = match &inner.frames[idx] {
                Some(f) => f.clone(),
                None => continue,
            };
            if frame.fix_count.load(Ordering::SeqCst) == 0 && !frame.is_dirty() {
                inner.lru.remove(pos);
                inner.hash.remove(&frame.page_id);
                inner.frames[idx] = None;
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("evicted frame {} ({})", idx, frame.page_id);
                return Ok(idx);
            }
        }
        warn!("buffer pool exhausted: no evictable frame found");
        Err(Error::OutOfMemory)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        for slot in inner.frames.iter_mut() {
            *slot = None;
        }
        inner.hash.clear();
        inner.lru.clear();
        inner.flush_list.clear();
        inner.free = (0..self.capacity).collect();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().hash.len()
    }
}
