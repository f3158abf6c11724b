//! Page header/trailer layout shared by every page type, plus the
//! `Encodeable`/`Decodeable` wire-format traits used throughout the engine
//! to turn in-memory structures into page bytes and back.

pub mod index_page;
pub mod record;

use crate::error::Error;
use crate::types::{Lsn, PageId, PageNo, SpaceId, PAGE_SIZE};

pub const HEADER_SIZE: usize = 38;
pub const TRAILER_SIZE: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PageType {
    Index,
    UndoLog,
    SegmentInode,
    SpaceHeader,
    ExtentDescriptor,
    IbufBitmap,
    TransactionSystem,
    BlobOverflow,
    AllocatedUnused,
}

impl PageType {
    pub fn to_u16(self) -> u16 {
        match self {
            PageType::AllocatedUnused => 0,
            PageType::ExtentDescriptor => 1,
            PageType::UndoLog => 2,
            PageType::SegmentInode => 3,
            PageType::IbufBitmap => 4,
            PageType::SpaceHeader => 5,
            PageType::TransactionSystem => 6,
            PageType::Index => 17855,
            PageType::BlobOverflow => 10,
        }
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0 => PageType::AllocatedUnused,
            1 => PageType::ExtentDescriptor,
            2 => PageType::UndoLog,
            3 => PageType::SegmentInode,
            4 => PageType::IbufBitmap,
            5 => PageType::SpaceHeader,
            6 => PageType::TransactionSystem,
            17855 => PageType::Index,
            10 => PageType::BlobOverflow,
            _ => return None,
        })
    }
}

/// The common 38-byte header present on every page, per the data model.
#[derive(Clone, Copy, Debug)]
pub struct PageHeader {
    pub checksum: u32,
    pub page_no: PageNo,
    pub prev_page_no: PageNo,
    pub next_page_no: PageNo,
    pub lsn: Lsn,
    pub page_type: PageType,
    /// Only meaningful on page 0 of a tablespace.
    pub flush_lsn: Lsn,
    pub space_id: SpaceId,
}

impl PageHeader {
    pub const NO_PAGE: PageNo = u32::MAX;

    pub fn new(id: PageId, page_type: PageType) -> Self {
        Self {
            checksum: 0,
            page_no: id.page_no,
            prev_page_no: Self::NO_PAGE,
            next_page_no: Self::NO_PAGE,
            lsn: 0,
            page_type,
            flush_lsn: 0,
            space_id: id.space_id,
        }
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        buf[4..8].copy_from_slice(&self.page_no.to_le_bytes());
        buf[8..12].copy_from_slice(&self.prev_page_no.to_le_bytes());
        buf[12..16].copy_from_slice(&self.next_page_no.to_le_bytes());
        buf[16..24].copy_from_slice(&self.lsn.to_le_bytes());
        buf[24..26].copy_from_slice(&self.page_type.to_u16().to_le_bytes());
        buf[26..34].copy_from_slice(&self.flush_lsn.to_le_bytes());
        buf[34..38].copy_from_slice(&self.space_id.to_le_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Result<Self, Error> {
        let page_type = u16::from_le_bytes([buf[24], buf[25]]);
        let page_type = PageType::from_u16(page_type)
            .ok_or_else(|| Error::LogCorruption("unknown page type".into()))?;
        Ok(Self {
            checksum: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            page_no: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            prev_page_no: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            next_page_no: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            lsn: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            page_type,
            flush_lsn: u64::from_le_bytes(buf[26..34].try_into().unwrap()),
            space_id: u32::from_le_bytes(buf[34..38].try_into().unwrap()),
        })
    }
}

/// Trailer written at the end of every page: a repeat of the low 4 bytes
/// of the LSN (the torn-write detector) plus a checksum.
#[derive(Clone, Copy, Debug)]
pub struct PageTrailer {
    pub lsn_low: u32,
    pub checksum: u32,
}

impl PageTrailer {
    pub fn write_to(&self, buf: &mut [u8]) {
        let off = PAGE_SIZE - TRAILER_SIZE;
        buf[off..off + 4].copy_from_slice(&self.lsn_low.to_le_bytes());
        buf[off + 4..off + 8].copy_from_slice(&self.checksum.to_le_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Self {
        let off = PAGE_SIZE - TRAILER_SIZE;
        Self {
            lsn_low: u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()),
            checksum: u32::from_le_bytes(buf[off + 4..off + 8].try_into().unwrap()),
        }
    }
}

/// Verify the torn-write invariant: the trailer's LSN must equal the low
/// 4 bytes of the header LSN, and the checksum must match the page bytes.
pub fn verify_page(id: PageId, buf: &[u8]) -> Result<PageHeader, Error> {
    let header = PageHeader::read_from(buf)?;
    let trailer = PageTrailer::read_from(buf);

    let expected_low = (header.lsn & 0xFFFF_FFFF) as u32;
    if trailer.lsn_low != expected_low {
        return Err(Error::PageCorruption(id));
    }

    let computed = checksum(buf);
    if trailer.checksum != computed {
        return Err(Error::PageCorruption(id));
    }

    Ok(header)
}

/// Fletcher-like rolling checksum over the page body (header excluded,
/// trailer excluded). Cheap and sufficient to catch torn writes and bit
/// rot; not a cryptographic checksum.
pub fn checksum(buf: &[u8]) -> u32 {
    let body = &buf[HEADER_SIZE..PAGE_SIZE - TRAILER_SIZE];
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in body {
        a = a.wrapping_add(byte as u32) % 65521;
        b = b.wrapping_add(a) % 65521;
    }
    (b << 16) | a
}

pub fn stamp_trailer(buf: &mut [u8], lsn: Lsn) {
    let trailer = PageTrailer {
        lsn_low: (lsn & 0xFFFF_FFFF) as u32,
        checksum: checksum(buf),
    };
    trailer.write_to(buf);
}

/// A binary encoder for wire/page formats, paralleling the teacher's
/// `io.rs` traits but kept crate-private to `page`/`log`.
pub trait Encodeable {
    fn encode(&self, buf: &mut Vec<u8>);
}

pub trait Decodeable: Sized {
    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, Error>;
}

macro_rules! impl_numeric {
    ($($t:ty),*) => {
        $(
            impl Encodeable for $t {
                fn encode(&self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(&self.to_le_bytes());
                }
            }

            impl Decodeable for $t {
                fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, Error> {
                    let size = std::mem::size_of::<$t>();
                    if *pos + size > buf.len() {
                        return Err(Error::LogCorruption("truncated record".into()));
                    }
                    let mut bytes = [0u8; std::mem::size_of::<$t>()];
                    bytes.copy_from_slice(&buf[*pos..*pos + size]);
                    *pos += size;
                    Ok(<$t>::from_le_bytes(bytes))
                }
            }
        )*
    };
}

impl_numeric!(u8, u16, u32, u64, i8, i16, i32, i64, usize);

impl Encodeable for bool {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(if *self { 1 } else { 0 });
    }
}

impl Decodeable for bool {
    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, Error> {
        let b = u8::decode(buf, pos)?;
        Ok(b != 0)
    }
}

impl Encodeable for Vec<u8> {
    fn encode(&self, buf: &mut Vec<u8>) {
        (self.len() as u32).encode(buf);
        buf.extend_from_slice(self);
    }
}

impl Decodeable for Vec<u8> {
    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, Error> {
        let len = u32::decode(buf, pos)? as usize;
        if *pos + len > buf.len() {
            return Err(Error::LogCorruption("truncated byte string".into()));
        }
        let out = buf[*pos..*pos + len].to_vec();
        *pos += len;
        Ok(out)
    }
}
