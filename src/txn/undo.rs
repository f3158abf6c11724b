//! Undo logs: per-transaction rollback segments holding the pre-images
//! needed to roll back a transaction and to synthesize older MVCC
//! versions via roll-ptr chains.

use crate::error::Error;
use crate::page::{Decodeable, Encodeable};
use crate::types::{PageNo, TrxId};

#[derive(Clone, Debug, PartialEq)]
pub enum UndoType {
    Insert,
    UpdateExisting,
    DeleteMark,
}

impl Encodeable for UndoType {
    fn encode(&self, buf: &mut Vec<u8>) {
        let tag: u8 = match self {
            UndoType::Insert => 0,
            UndoType::UpdateExisting => 1,
            UndoType::DeleteMark => 2,
        };
        tag.encode(buf);
    }
}

impl Decodeable for UndoType {
    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, Error> {
        match u8::decode(buf, pos)? {
            0 => Ok(UndoType::Insert),
            1 => Ok(UndoType::UpdateExisting),
            2 => Ok(UndoType::DeleteMark),
            t => Err(Error::LogCorruption(format!("unknown undo type tag {}", t))),
        }
    }
}

/// `{type, table-id, undo-no, primary-key, previous field values for
/// UPDATE}`. Linked inside undo pages; a record's `roll_ptr` points to
/// the newest undo record in this chain for that key.
#[derive(Clone, Debug)]
pub struct UndoRecord {
    pub undo_type: UndoType,
    pub table_id: u64,
    pub undo_no: u64,
    pub primary_key: Vec<u8>,
    /// Field values as they were *before* the mutation this record
    /// undoes; empty for a pure INSERT (undoing it just deletes).
    pub previous_fields: Vec<Vec<u8>>,
    /// The roll-ptr this record's owning transaction row had *before*
    /// this mutation, continuing the version chain.
    pub prev_roll_ptr: Option<u64>,
}

impl Encodeable for UndoRecord {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.undo_type.encode(buf);
        self.table_id.encode(buf);
        self.undo_no.encode(buf);
        self.primary_key.clone().encode(buf);
        (self.previous_fields.len() as u32).encode(buf);
        for f in &self.previous_fields {
            f.clone().encode(buf);
        }
        match self.prev_roll_ptr {
            Some(rp) => {
                true.encode(buf);
                rp.encode(buf);
            }
            None => false.encode(buf),
        }
    }
}

impl Decodeable for UndoRecord {
    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, Error> {
        let undo_type = UndoType::decode(buf, pos)?;
        let table_id = u64::decode(buf, pos)?;
        let undo_no = u64::decode(buf, pos)?;
        let primary_key = Vec::<u8>::decode(buf, pos)?;
        let n = u32::decode(buf, pos)? as usize;
        let mut previous_fields = Vec::with_capacity(n);
        for _ in 0..n {
            previous_fields.push(Vec::<u8>::decode(buf, pos)?);
        }
        let has_roll_ptr = bool::decode(buf, pos)?;
        let prev_roll_ptr = if has_roll_ptr {
            Some(u64::decode(buf, pos)?)
        } else {
            None
        };
        Ok(UndoRecord {
            undo_type,
            table_id,
            undo_no,
            primary_key,
            previous_fields,
            prev_roll_ptr,
        })
    }
}

/// One transaction's undo log: a monotone sequence of undo records,
/// consulted newest-first on rollback and by MVCC to synthesize older
/// versions.
#[derive(Default, Debug)]
pub struct UndoLog {
    pub trx_id: TrxId,
    pub records: Vec<UndoRecord>,
    next_undo_no: u64,
}

impl UndoLog {
    pub fn new(trx_id: TrxId) -> Self {
        Self {
            trx_id,
            records: Vec::new(),
            next_undo_no: 0,
        }
    }

    /// Rebuild an undo log from records recovered off the WAL, in
    /// ascending `undo_no` order.
    pub fn from_recovered(trx_id: TrxId, mut records: Vec<UndoRecord>) -> Self {
        records.sort_by_key(|r| r.undo_no);
        let next_undo_no = records.last().map(|r| r.undo_no + 1).unwrap_or(0);
        Self {
            trx_id,
            records,
            next_undo_no,
        }
    }

    pub fn append(
        &mut self,
        undo_type: UndoType,
        table_id: u64,
        primary_key: Vec<u8>,
        previous_fields: Vec<Vec<u8>>,
        prev_roll_ptr: Option<u64>,
    ) -> u64 {
        let undo_no = self.next_undo_no;
        self.next_undo_no += 1;
        self.records.push(UndoRecord {
            undo_type,
            table_id,
            undo_no,
            primary_key,
            previous_fields,
            prev_roll_ptr,
        });
        undo_no
    }

    /// Iterate newest-first, as rollback and purge both require.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &UndoRecord> {
        self.records.iter().rev()
    }

    pub fn get(&self, undo_no: u64) -> Option<&UndoRecord> {
        self.records.iter().find(|r| r.undo_no == undo_no)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A rollback segment groups undo logs for a set of transactions,
/// allocated from its own page run. This model keeps it in memory,
/// keyed by owning transaction; the page-backed form mirrors the
/// layout in the undo-page data-model entry.
#[derive(Default)]
pub struct RollbackSegment {
    pub header_page: PageNo,
    pub logs: std::collections::HashMap<TrxId, UndoLog>,
}

impl RollbackSegment {
    pub fn new(header_page: PageNo) -> Self {
        Self {
            header_page,
            logs: std::collections::HashMap::new(),
        }
    }

    pub fn open_log(&mut self, trx_id: TrxId) -> &mut UndoLog {
        self.logs.entry(trx_id).or_insert_with(|| UndoLog::new(trx_id))
    }
}
