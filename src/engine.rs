//! The engine value. Groups the buffer pool, lock manager, log
//! manager, transaction manager and catalog behind `Arc` and is
//! threaded explicitly into every operation, rather than reached for
//! through a process-wide singleton — see DESIGN.md's "Global state"
//! entry for the reasoning.

use std::sync::Arc;

use log::info;

use crate::catalog::{InMemoryCatalog, SchemaOracle};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::lock::LockManager;
use crate::log::LogManager;
use crate::purge::PurgeWorker;
use crate::storage::BufferPool;
use crate::txn::TransactionManager;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShutdownMode {
    Normal,
    NoFlush,
}

pub struct Engine {
    pub config: EngineConfig,
    pub buffer_pool: Arc<BufferPool>,
    pub lock_manager: Arc<LockManager>,
    pub log_manager: Arc<LogManager>,
    pub trx_manager: Arc<TransactionManager>,
    pub catalog: Arc<InMemoryCatalog>,
    purge: PurgeWorker,
}

impl Engine {
    /// Initialize log files, run recovery, and return a ready engine.
    /// Does not yet spawn background flusher/purge threads — callers
    /// that want them running call `spawn_background_workers`.
    pub fn open(config: EngineConfig) -> Result<Self, Error> {
        std::fs::create_dir_all(&config.data_dir)?;
        let log_dir = config.data_dir.join("log");

        let log_manager = Arc::new(LogManager::open(
            &log_dir,
            config.log_file_count,
            config.log_file_size,
        )?);
        let buffer_pool = Arc::new(BufferPool::new(&config));
        let lock_manager = Arc::new(LockManager::new(&config));
        let trx_manager = Arc::new(TransactionManager::new(
            lock_manager.clone(),
            log_manager.clone(),
        ));
        let catalog = Arc::new(InMemoryCatalog::new());
        let purge = PurgeWorker::new();

        let engine = Self {
            config,
            buffer_pool,
            lock_manager,
            log_manager,
            trx_manager,
            catalog,
            purge,
        };

        crate::log::recovery::recover(&engine)?;

        info!("engine opened at {}", engine.config.data_dir.display());
        Ok(engine)
    }

    pub fn mtr(&self) -> crate::mtr::Mtr<'_> {
        crate::mtr::Mtr::start(self)
    }

    /// Create a brand-new tablespace file under the engine's data
    /// directory and register it with the buffer pool. One file per
    /// index, per DESIGN.md's "Tablespace layout" decision.
    pub fn create_table_space(&self, space_id: crate::types::SpaceId, file_name: &str) -> Result<(), Error> {
        let path = self.config.data_dir.join(file_name);
        let space = crate::storage::Tablespace::create(space_id, &path)?;
        self.buffer_pool.register_space(space);
        Ok(())
    }

    /// Open an already-existing tablespace file (used when reopening an
    /// engine against a data directory from a previous run).
    pub fn open_table_space(&self, space_id: crate::types::SpaceId, file_name: &str) -> Result<(), Error> {
        let path = self.config.data_dir.join(file_name);
        let space = crate::storage::Tablespace::open(space_id, &path)?;
        self.buffer_pool.register_space(space);
        Ok(())
    }

    /// Roll back every transaction crash recovery found incomplete.
    /// Call once every tablespace and the catalog are registered —
    /// `open`'s own recovery pass runs too early to do this itself, so
    /// it only identifies the work and adopts it onto the transaction
    /// manager. A no-op if recovery found nothing to roll back.
    pub fn rollback_recovered_transactions(&self) -> Result<usize, Error> {
        crate::log::recovery::rollback_incomplete(self)
    }

    /// Allocate a fresh page number within `space_id` (the space must
    /// already be registered).
    pub fn allocate_page(&self, space_id: crate::types::SpaceId) -> Result<crate::types::PageNo, Error> {
        let mut spaces = self.buffer_pool.spaces.lock().unwrap();
        let space = spaces
            .get_mut(&space_id)
            .ok_or_else(|| Error::InvalidInput(format!("unknown space {}", space_id)))?;
        space.allocate_page()
    }

    /// Run one purge pass: ask the transaction manager for the oldest
    /// visible low-limit, drop undo logs no live read view can reach
    /// back into, and let the caller physically unlink delete-marked
    /// rows older than that same limit.
    pub fn run_purge_pass(
        &self,
        unlink: impl FnMut(crate::types::TrxId) -> Result<usize, Error>,
    ) -> Result<usize, Error> {
        let limit = self.trx_manager.oldest_active_low_limit();
        let dropped_undo = self.trx_manager.purge_below(limit);
        let unlinked = self.purge.run_once(limit, unlink)?;
        Ok(dropped_undo + unlinked)
    }

    /// Drain the purge queue, flush all dirty pages, write a final
    /// checkpoint, and close files.
    pub fn shutdown(&self, mode: ShutdownMode) -> Result<(), Error> {
        if mode == ShutdownMode::Normal {
            let target = self.log_manager.write_lsn();
            self.buffer_pool
                .flush_up_to(target, |lsn| self.log_manager.flush_to(lsn))?;
            let min_dirty = self.buffer_pool.oldest_dirty_lsn();
            self.log_manager.checkpoint(min_dirty)?;
        }
        info!("engine shut down ({:?})", mode);
        Ok(())
    }
}
