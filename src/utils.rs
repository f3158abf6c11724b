use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shorthand for `.read()`/`.write()` on a `RwLock` that panics on
/// poisoning instead of threading a `PoisonError` through every caller.
///
/// A poisoned lock means some other thread already panicked while holding
/// it; the engine has bigger problems at that point than a clean error.
pub trait HandyRwLock<T> {
    fn rl(&self) -> RwLockReadGuard<'_, T>;
    fn wl(&self) -> RwLockWriteGuard<'_, T>;
}

impl<T> HandyRwLock<T> for RwLock<T> {
    fn rl(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap()
    }

    fn wl(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap()
    }
}

pub fn init_log() {
    use env_logger::Builder;
    use std::io::Write;

    let mut builder = Builder::from_default_env();
    builder
        .format_timestamp_micros()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} - {}] [{}:{}] {}",
                record.level(),
                record.target(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init()
        .ok();
}
