use std::sync::{Arc, RwLock};

use crate::error::Error;

/// Type alias, not a new type, cannot define methods on it.
pub type Pod<T> = Arc<RwLock<T>>;

pub type SmallResult = Result<(), Error>;

/// Log sequence number. Strictly monotonic, 64-bit, byte-addressable
/// position in the logical redo log.
pub type Lsn = u64;

/// Transaction id. Monotonic, assigned at first write.
pub type TrxId = u64;

/// Identifies a tablespace (one file per index, see DESIGN.md).
pub type SpaceId = u32;

/// Page number within a tablespace.
pub type PageNo = u32;

/// Position of a record within a page's heap-allocation order.
pub type HeapNo = u16;

/// Index identifier, looked up through the catalog's schema oracle.
pub type IndexId = u64;

pub const PAGE_SIZE: usize = 16 * 1024;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct PageId {
    pub space_id: SpaceId,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(space_id: SpaceId, page_no: PageNo) -> Self {
        Self { space_id, page_no }
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}, {}>", self.space_id, self.page_no)
    }
}
