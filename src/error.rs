use thiserror::Error;

/// The broad category a caller needs in order to decide whether to retry,
/// surface the error to the user, or shut the engine down.
///
/// Mirrors the taxonomy a storage engine exposes at its API boundary: most
/// callers only branch on `kind()`, not on the specific variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retriable by the caller without any change in its request.
    Transient,
    /// Non-retriable; the request itself was invalid or conflicted.
    Logical,
    /// The host is out of some resource (memory, file slots, disk).
    Resource,
    /// Durability or corruption; the instance should be considered unhealthy.
    Durability,
    /// Lower-level failure handled internally in the common case.
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    // --- TRANSIENT, retriable by caller ---
    #[error("lock wait timed out after {0:?}")]
    LockWaitTimeout(std::time::Duration),

    #[error("transaction {0} was chosen as deadlock victim")]
    Deadlock(crate::types::TrxId),

    // --- LOGICAL, non-retriable ---
    #[error("duplicate key")]
    DuplicateKey,

    #[error("row not found")]
    RowNotFound,

    #[error("no referenced row")]
    NoReferencedRow,

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // --- RESOURCE ---
    #[error("out of memory")]
    OutOfMemory,

    #[error("out of file space")]
    OutOfFileSpace,

    #[error("out of disk space")]
    OutOfDiskSpace,

    // --- DURABILITY / CORRUPTION (fatal) ---
    #[error("page corruption at {0}")]
    PageCorruption(crate::types::PageId),

    #[error("log corruption: {0}")]
    LogCorruption(String),

    #[error("io error past retry: {0}")]
    IoError(String),

    #[error("engine has been shut down after a durability failure")]
    EngineShut,

    // --- INTERNAL ---
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            LockWaitTimeout(_) | Deadlock(_) => ErrorKind::Transient,
            DuplicateKey
            | RowNotFound
            | NoReferencedRow
            | ConstraintViolation(_)
            | SchemaError(_)
            | InvalidInput(_) => ErrorKind::Logical,
            OutOfMemory | OutOfFileSpace | OutOfDiskSpace => ErrorKind::Resource,
            PageCorruption(_) | LogCorruption(_) | IoError(_) | EngineShut => {
                ErrorKind::Durability
            }
            Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may simply retry the exact same request.
    pub fn is_retriable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::Internal(format!("poisoned lock: {}", e))
    }
}
