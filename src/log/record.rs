//! Redo log record format: `{type, space-id, page-no, body}`. A group
//! committed by one MTR is terminated by `MultiRecEnd`; during recovery
//! a partial tail missing that terminator is discarded.

use crate::page::{Decodeable, Encodeable};
use crate::types::{Lsn, PageNo, SpaceId, TrxId};

#[derive(Clone, Debug, PartialEq)]
pub enum LogBody {
    /// Physiological write of `bytes` at `offset` within the page.
    WriteBytes { offset: u16, bytes: Vec<u8> },
    RecInsert { heap_no: u16, record: Vec<u8> },
    RecDelete { heap_no: u16 },
    UndoInsert { trx_id: TrxId, undo_no: u64, record: Vec<u8> },
    FileCreate,
    MultiRecEnd,
    Checkpoint { checkpoint_lsn: Lsn },
    TrxStart { trx_id: TrxId },
    TrxCommit { trx_id: TrxId },
    TrxAbort { trx_id: TrxId },
}

impl LogBody {
    fn tag(&self) -> u8 {
        match self {
            LogBody::WriteBytes { .. } => 1,
            LogBody::RecInsert { .. } => 2,
            LogBody::RecDelete { .. } => 3,
            LogBody::UndoInsert { .. } => 4,
            LogBody::FileCreate => 5,
            LogBody::MultiRecEnd => 6,
            LogBody::Checkpoint { .. } => 7,
            LogBody::TrxStart { .. } => 8,
            LogBody::TrxCommit { .. } => 9,
            LogBody::TrxAbort { .. } => 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub space_id: SpaceId,
    pub page_no: PageNo,
    pub body: LogBody,
}

impl LogRecord {
    pub fn is_multi_rec_end(&self) -> bool {
        matches!(self.body, LogBody::MultiRecEnd)
    }
}

impl Encodeable for LogRecord {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.body.tag().encode(buf);
        self.space_id.encode(buf);
        self.page_no.encode(buf);
        match &self.body {
            LogBody::WriteBytes { offset, bytes } => {
                offset.encode(buf);
                bytes.clone().encode(buf);
            }
            LogBody::RecInsert { heap_no, record } => {
                heap_no.encode(buf);
                record.clone().encode(buf);
            }
            LogBody::RecDelete { heap_no } => {
                heap_no.encode(buf);
            }
            LogBody::UndoInsert {
                trx_id,
                undo_no,
                record,
            } => {
                trx_id.encode(buf);
                undo_no.encode(buf);
                record.clone().encode(buf);
            }
            LogBody::FileCreate => {}
            LogBody::MultiRecEnd => {}
            LogBody::Checkpoint { checkpoint_lsn } => {
                checkpoint_lsn.encode(buf);
            }
            LogBody::TrxStart { trx_id }
            | LogBody::TrxCommit { trx_id }
            | LogBody::TrxAbort { trx_id } => {
                trx_id.encode(buf);
            }
        }
    }
}

impl Decodeable for LogRecord {
    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, crate::error::Error> {
        let tag = u8::decode(buf, pos)?;
        let space_id = SpaceId::decode(buf, pos)?;
        let page_no = PageNo::decode(buf, pos)?;
        let body = match tag {
            1 => {
                let offset = u16::decode(buf, pos)?;
                let bytes = Vec::<u8>::decode(buf, pos)?;
                LogBody::WriteBytes { offset, bytes }
            }
            2 => {
                let heap_no = u16::decode(buf, pos)?;
                let record = Vec::<u8>::decode(buf, pos)?;
                LogBody::RecInsert { heap_no, record }
            }
            3 => {
                let heap_no = u16::decode(buf, pos)?;
                LogBody::RecDelete { heap_no }
            }
            4 => {
                let trx_id = u64::decode(buf, pos)?;
                let undo_no = u64::decode(buf, pos)?;
                let record = Vec::<u8>::decode(buf, pos)?;
                LogBody::UndoInsert {
                    trx_id,
                    undo_no,
                    record,
                }
            }
            5 => LogBody::FileCreate,
            6 => LogBody::MultiRecEnd,
            7 => {
                let checkpoint_lsn = u64::decode(buf, pos)?;
                LogBody::Checkpoint { checkpoint_lsn }
            }
            8 => LogBody::TrxStart {
                trx_id: u64::decode(buf, pos)?,
            },
            9 => LogBody::TrxCommit {
                trx_id: u64::decode(buf, pos)?,
            },
            10 => LogBody::TrxAbort {
                trx_id: u64::decode(buf, pos)?,
            },
            _ => {
                return Err(crate::error::Error::LogCorruption(format!(
                    "unknown log record tag {}",
                    tag
                )))
            }
        };
        Ok(LogRecord {
            space_id,
            page_no,
            body,
        })
    }
}
