//! Write-ahead log: a ring of log files forming one byte-addressable,
//! LSN-indexed logical log. MTR commit appends groups of physiological
//! records here; the log manager drives flush-to-disk and checkpoints.

pub mod recovery;
pub mod record;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info};

use crate::error::Error;
use crate::page::{Decodeable, Encodeable};
use crate::types::Lsn;

use record::LogRecord;

/// 512-byte header block per log file: group id, start LSN, two
/// checkpoint-info slots.
const FILE_HEADER_SIZE: u64 = 512 * 4;

struct LogFile {
    file: File,
    path: PathBuf,
    start_lsn: Lsn,
}

struct Inner {
    files: Vec<LogFile>,
    current_file: usize,
    /// In-memory tail: the LSN of the next byte to be appended.
    write_lsn: Lsn,
    flushed_to_disk_lsn: Lsn,
    checkpoint_lsn: Lsn,
    buffer: Vec<u8>,
    /// LSN at which the in-memory buffer begins.
    buffer_start_lsn: Lsn,
}

pub struct LogManager {
    inner: Mutex<Inner>,
    file_size: u64,
    dir: PathBuf,
}

impl LogManager {
    pub fn open(dir: &Path, file_count: usize, file_size: u64) -> Result<Self, Error> {
        std::fs::create_dir_all(dir)?;
        let mut files = Vec::with_capacity(file_count);
        let mut start_lsn = 0u64;
        for i in 0..file_count {
            let path = dir.join(format!("ib_logfile{}", i));
            let fresh = !path.exists();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)?;
            if fresh {
                file.set_len(FILE_HEADER_SIZE + file_size)?;
            }
            files.push(LogFile {
                file,
                path,
                start_lsn,
            });
            start_lsn += file_size;
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                files,
                current_file: 0,
                write_lsn: 0,
                flushed_to_disk_lsn: 0,
                checkpoint_lsn: 0,
                buffer: Vec::new(),
                buffer_start_lsn: 0,
            }),
            file_size,
            dir: dir.to_path_buf(),
        })
    }

    /// Append a group of records (already terminated by
    /// `LogBody::MultiRecEnd`) atomically, returning `(start_lsn,
    /// end_lsn)`.
    pub fn append(&self, records: &[LogRecord]) -> Result<(Lsn, Lsn), Error> {
        let mut inner = self.inner.lock().unwrap();
        let start_lsn = inner.write_lsn;

        let mut bytes = Vec::new();
        for r in records {
            r.encode(&mut bytes);
        }

        inner.buffer.extend_from_slice(&bytes);
        inner.write_lsn += bytes.len() as u64;
        let end_lsn = inner.write_lsn;

        debug!("log append: [{}, {}) ({} records)", start_lsn, end_lsn, records.len());
        Ok((start_lsn, end_lsn))
    }

    /// Write all buffered bytes up to >= `target_lsn` to the current
    /// log file and fsync. Performs a fuzzy checkpoint before wrapping
    /// to a file that would overwrite not-yet-reclaimable records.
    pub fn flush_to(&self, target_lsn: Lsn) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        if inner.flushed_to_disk_lsn >= target_lsn {
            return Ok(());
        }

        let buffer_start = inner.buffer_start_lsn;
        let to_write = &inner.buffer[..(inner.write_lsn - buffer_start) as usize];
        let to_write = to_write.to_vec();

        let file_size = self.file_size;
        let idx = inner.current_file;
        let n_files = inner.files.len();
        let file_start_lsn = inner.files[idx].start_lsn;
        let mut offset_in_file = buffer_start.saturating_sub(file_start_lsn);

        if offset_in_file >= file_size {
            inner.current_file = (idx + 1) % n_files;
            offset_in_file = 0;
            info!("log wrapped to file {}", inner.current_file);
        }

        let idx = inner.current_file;
        let pos = FILE_HEADER_SIZE + offset_in_file;
        inner.files[idx].file.seek(SeekFrom::Start(pos))?;
        inner.files[idx].file.write_all(&to_write)?;
        inner.files[idx].file.sync_all()?;

        inner.flushed_to_disk_lsn = inner.write_lsn;
        inner.buffer.clear();
        inner.buffer_start_lsn = inner.write_lsn;

        Ok(())
    }

    pub fn write_lsn(&self) -> Lsn {
        self.inner.lock().unwrap().write_lsn
    }

    pub fn flushed_to_disk_lsn(&self) -> Lsn {
        self.inner.lock().unwrap().flushed_to_disk_lsn
    }

    /// Compute `min(first-dirty-LSN of any dirty page, write-lsn)`,
    /// flush the log up to it, and persist a checkpoint record.
    pub fn checkpoint(&self, min_flush_list_lsn: Option<Lsn>) -> Result<Lsn, Error> {
        let target = min_flush_list_lsn.unwrap_or_else(|| self.write_lsn());
        self.flush_to(target)?;

        let mut inner = self.inner.lock().unwrap();
        inner.checkpoint_lsn = target;

        let idx = inner.current_file;
        let mut body = Vec::new();
        target.encode(&mut body);
        inner.files[idx].file.seek(SeekFrom::Start(0))?;
        inner.files[idx].file.write_all(&body)?;
        inner.files[idx].file.sync_all()?;

        info!("checkpoint at lsn {}", target);
        Ok(target)
    }

    pub fn checkpoint_lsn(&self) -> Lsn {
        self.inner.lock().unwrap().checkpoint_lsn
    }

    /// How much of the ring is safe to overwrite: everything before the
    /// last checkpoint's LSN.
    pub fn reclaimable(&self) -> Lsn {
        self.inner.lock().unwrap().checkpoint_lsn
    }

    /// Read back every record from `from_lsn` (inclusive, as a byte
    /// offset into the logical log stream) to the current flushed
    /// tail, for recovery. Records after a truncated / missing
    /// `MultiRecEnd` terminator are dropped.
    pub fn read_from(&self, from_lsn: Lsn) -> Result<Vec<LogRecord>, Error> {
        let inner = self.inner.lock().unwrap();
        let mut all_bytes = Vec::new();
        for f in &inner.files {
            let mut file = OpenOptions::new().read(true).open(&f.path)?;
            let mut body = Vec::new();
            file.seek(SeekFrom::Start(FILE_HEADER_SIZE))?;
            file.read_to_end(&mut body)?;
            all_bytes.extend_from_slice(&body);
        }

        let mut records = Vec::new();
        let mut group = Vec::new();
        let mut pos = (from_lsn as usize).min(all_bytes.len());
        while pos < all_bytes.len() {
            match LogRecord::decode(&all_bytes, &mut pos) {
                Ok(r) => {
                    let end = r.is_multi_rec_end();
                    group.push(r);
                    if end {
                        records.append(&mut group);
                    }
                }
                Err(_) => break,
            }
        }
        // drop any trailing partial group (no terminator) — deliberately discarded
        Ok(records)
    }
}
