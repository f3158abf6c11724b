use std::path::PathBuf;
use std::time::Duration;

/// Tunables read by the core subsystems. Parsing these out of a config
/// file or environment is an external collaborator's job; this struct is
/// just the landing spot the engine reads from.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Directory holding tablespace files and the log file ring.
    pub data_dir: PathBuf,

    /// Number of 16 KiB frames held in the buffer pool.
    pub buffer_pool_frames: usize,

    /// Number of log files in the ring.
    pub log_file_count: usize,

    /// Size, in bytes, of each log file.
    pub log_file_size: u64,

    /// How often the checkpointer runs, absent an explicit trigger
    /// (log wrap-around, shutdown).
    pub checkpoint_interval: Duration,

    /// How long a lock request waits before returning `LOCK_WAIT_TIMEOUT`.
    pub lock_wait_timeout: Duration,

    /// Bound on the deadlock-detection DFS depth.
    pub deadlock_search_depth: usize,

    /// Fraction of the LRU, measured from the tail, considered "old".
    /// A page must dwell here for `old_page_dwell` before a re-touch
    /// promotes it to the young head.
    pub lru_old_ratio: f64,
    pub old_page_dwell: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/default_db"),
            buffer_pool_frames: 1024,
            log_file_count: 2,
            log_file_size: 16 * 1024 * 1024,
            checkpoint_interval: Duration::from_secs(30),
            lock_wait_timeout: Duration::from_secs(10),
            deadlock_search_depth: 200,
            lru_old_ratio: 3.0 / 8.0,
            old_page_dwell: Duration::from_secs(1),
        }
    }
}
