//! Record layout: `{header, nullable-bitmap, variable-length-array,
//! field-bytes}`. Clustered-index records additionally embed the
//! `(trx-id, roll-ptr)` system columns MVCC reads against.

use super::{Decodeable, Encodeable};
use crate::error::Error;
use crate::types::{HeapNo, Lsn, TrxId};

pub const INFIMUM_OFFSET: u16 = 99;
pub const SUPREMUM_OFFSET: u16 = 112;

/// Info bits kept in the record header's leading byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InfoBits(u8);

impl InfoBits {
    pub const DELETED: u8 = 0b0000_0001;
    pub const MIN_REC: u8 = 0b0000_0010;

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & (Self::DELETED | Self::MIN_REC))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn insert(&mut self, flag: u8) {
        self.0 |= flag;
    }
}

/// A clustered-index record's hidden system columns, used for MVCC.
#[derive(Clone, Copy, Debug)]
pub struct SystemColumns {
    pub trx_id: TrxId,
    /// Points at the undo record yielding the previous version; `None`
    /// means this is the only version (no prior undo entry).
    pub roll_ptr: Option<u64>,
}

/// A single user record: header metadata plus the encoded field bytes.
/// Held in memory (not a raw page slice) so row operations, MVCC
/// chaining and the B+ tree can all share one representation; page
/// code is responsible for (de)serializing it into the slotted layout.
#[derive(Clone, Debug)]
pub struct Record {
    pub heap_no: HeapNo,
    pub info_bits: InfoBits,
    /// Number of records this record's directory slot currently owns;
    /// zero unless this record is a slot owner.
    pub n_owned: u8,
    pub fields: Vec<Vec<u8>>,
    pub system: Option<SystemColumns>,
}

impl Record {
    pub fn new(heap_no: HeapNo, fields: Vec<Vec<u8>>, system: Option<SystemColumns>) -> Self {
        Self {
            heap_no,
            info_bits: InfoBits::empty(),
            n_owned: 0,
            fields,
            system,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.info_bits.contains(InfoBits::DELETED)
    }

    pub fn mark_deleted(&mut self, del_trx: TrxId) {
        self.info_bits.insert(InfoBits::DELETED);
        if let Some(sys) = &mut self.system {
            sys.trx_id = del_trx;
        }
    }

    /// First field is conventionally the (possibly composite) key.
    pub fn key(&self) -> &[u8] {
        self.fields.first().map(|f| f.as_slice()).unwrap_or(&[])
    }
}

impl Encodeable for Record {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.info_bits.bits());
        self.n_owned.encode(buf);
        self.heap_no.encode(buf);

        match &self.system {
            Some(sys) => {
                true.encode(buf);
                sys.trx_id.encode(buf);
                match sys.roll_ptr {
                    Some(rp) => {
                        true.encode(buf);
                        rp.encode(buf);
                    }
                    None => false.encode(buf),
                }
            }
            None => false.encode(buf),
        }

        (self.fields.len() as u16).encode(buf);
        // nullable bitmap: one bit per field, 1 == null.
        let mut bitmap = vec![0u8; (self.fields.len() + 7) / 8];
        for (i, f) in self.fields.iter().enumerate() {
            if f.is_empty() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        buf.extend_from_slice(&bitmap);

        for f in &self.fields {
            f.clone().encode(buf);
        }
    }
}

impl Decodeable for Record {
    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, Error> {
        let info_bits = InfoBits::from_bits_truncate(u8::decode(buf, pos)?);
        let n_owned = u8::decode(buf, pos)?;
        let heap_no = HeapNo::decode(buf, pos)?;

        let has_system = bool::decode(buf, pos)?;
        let system = if has_system {
            let trx_id = u64::decode(buf, pos)?;
            let has_roll_ptr = bool::decode(buf, pos)?;
            let roll_ptr = if has_roll_ptr {
                Some(u64::decode(buf, pos)?)
            } else {
                None
            };
            Some(SystemColumns { trx_id, roll_ptr })
        } else {
            None
        };

        let n_fields = u16::decode(buf, pos)? as usize;
        let bitmap_len = (n_fields + 7) / 8;
        if *pos + bitmap_len > buf.len() {
            return Err(Error::LogCorruption("truncated record bitmap".into()));
        }
        let bitmap = buf[*pos..*pos + bitmap_len].to_vec();
        *pos += bitmap_len;

        let mut fields = Vec::with_capacity(n_fields);
        for i in 0..n_fields {
            let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
            if is_null {
                fields.push(Vec::new());
            } else {
                fields.push(Vec::<u8>::decode(buf, pos)?);
            }
        }

        Ok(Record {
            heap_no,
            info_bits,
            n_owned,
            fields,
            system,
        })
    }
}

/// Logical inverse of a record mutation, used both by undo (rollback)
/// and redo application during recovery. `page_lsn` is stamped once the
/// owning MTR commits.
#[derive(Clone, Debug)]
pub struct RecordDelta {
    pub heap_no: HeapNo,
    pub before: Option<Record>,
    pub after: Option<Record>,
    pub page_lsn: Lsn,
}
