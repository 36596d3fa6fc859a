use std::io::Error;
use std::sync::{Arc, PoisonError};
use thiserror::Error as ThisError;

pub mod compare;
pub mod filename;
pub mod io;
pub mod iterator;
pub mod key;
pub mod metric;
pub mod opts;
pub mod snapshot;
pub mod table;
pub mod table_cache;
pub mod utils;
pub mod version;

pub use snapshot::{Snapshot, SnapshotList};
pub use table_cache::TableCache;
pub use version::edit::VersionEdit;
pub use version::file_meta::FileMetaData;

#[derive(Debug, Clone, ThisError)]
pub enum LError {
    #[error("io error: {0}")]
    IO(Arc<Error>),
    #[error("corruption: {0}")]
    Corruption(String),
    #[error("invalid file: {0}")]
    InvalidFile(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("lock error: {0}")]
    LockError(String),
    #[error("invalid internal key: {0:?}")]
    InvalidInternalKey(Vec<u8>),
}

impl LError {
    pub(crate) fn corruption<S: Into<String>>(msg: S) -> Self {
        LError::Corruption(msg.into())
    }

    pub(crate) fn precondition<S: Into<String>>(msg: S) -> Self {
        LError::Precondition(msg.into())
    }

    /// Whether the error means the bytes read do not form a valid record,
    /// as opposed to an environment failure.
    pub fn is_corruption(&self) -> bool {
        matches!(self, LError::Corruption(_) | LError::InvalidInternalKey(_))
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, LError::Precondition(_))
    }
}

impl From<Error> for LError {
    fn from(e: Error) -> Self {
        Self::IO(Arc::new(e))
    }
}

impl<T> From<PoisonError<T>> for LError {
    fn from(value: PoisonError<T>) -> Self {
        LError::LockError(value.to_string())
    }
}

impl From<std::fmt::Error> for LError {
    fn from(value: std::fmt::Error) -> Self {
        LError::Internal(format!("{}", value))
    }
}

impl From<prometheus::Error> for LError {
    fn from(value: prometheus::Error) -> Self {
        LError::Internal(format!("metrics: {}", value))
    }
}

#[cfg(test)]
mod test {
    use crate::LError;

    #[test]
    fn test_error_kinds() {
        assert!(LError::corruption("bad tag").is_corruption());
        assert!(LError::InvalidInternalKey(vec![1, 2]).is_corruption());
        assert!(!LError::precondition("empty").is_corruption());
        assert!(LError::precondition("empty").is_precondition());

        let io: LError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(!io.is_corruption());
        // errors are replayable
        let cloned = io.clone();
        assert_eq!(format!("{}", cloned), "io error: gone");
    }
}
