//! Background purge worker: periodically recomputes the oldest active
//! read view's low-limit and asks for undo logs / delete-marked
//! records older than that limit to be physically discarded.
//!
//! Modeled as a short loop of {pick work, do I/O, sleep on condition
//! variable}, the same shape the log flusher and checkpointer use —
//! no callback/continuation machinery needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info};

use crate::error::Error;
use crate::types::TrxId;

pub struct PurgeWorker {
    shutdown: Arc<AtomicBool>,
    wake: Arc<(Mutex<bool>, Condvar)>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PurgeWorker {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new((Mutex::new(false), Condvar::new())),
            handle: Mutex::new(None),
        }
    }

    /// Run a single purge pass synchronously: `unlink` is handed the
    /// low-limit and returns how many records/undo entries it removed.
    pub fn run_once(
        &self,
        low_limit: TrxId,
        mut unlink: impl FnMut(TrxId) -> Result<usize, Error>,
    ) -> Result<usize, Error> {
        let removed = unlink(low_limit)?;
        if removed > 0 {
            debug!("purge pass removed {} entries below trx {}", removed, low_limit);
        }
        Ok(removed)
    }

    /// Spawn the long-lived background thread. `cycle` is called once
    /// per wake-up (periodic, or on explicit `notify`) and should
    /// internally call `run_once`.
    pub fn spawn_loop(&self, period: Duration, mut cycle: impl FnMut() + Send + 'static) {
        let shutdown = self.shutdown.clone();
        let wake = self.wake.clone();

        let join = std::thread::spawn(move || {
            let (lock, cvar) = &*wake;
            loop {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                cycle();

                let guard = lock.lock().unwrap();
                let _ = cvar.wait_timeout(guard, period).unwrap();
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
            }
            info!("purge worker stopped");
        });
        *self.handle.lock().unwrap() = Some(join);
    }

    pub fn notify(&self) {
        let (_lock, cvar) = &*self.wake;
        cvar.notify_all();
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify();
        if let Some(h) = self.handle.lock().unwrap().take() {
            let _ = h.join();
        }
    }
}

impl Drop for PurgeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
