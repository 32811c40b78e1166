/// Archive Error Kinds
///
/// One error type for the whole core, with a variant per failure
/// class. Lookups distinguish NotFound (entity absent, index healthy)
/// from Unavailable (height outside the indexed range, retryable by
/// the client). Mismatch and CorruptRecord are fatal for the mapper;
/// Finished and Canceled are normal terminations.

use std::fmt;

#[derive(Debug, Clone)]
pub enum ArchiveError {
    /// The looked-up entity was never indexed. Never fatal.
    NotFound(String),
    /// The requested height is outside [first, last]. Retryable.
    Unavailable(String),
    /// The chain source has no more sealed heights, or the feeder is
    /// exhausted. Normal end of the mapper lifecycle.
    Finished,
    /// Delta stream and trie disagree, or a commit appears twice.
    /// Indexing halts; the operator investigates.
    Mismatch(String),
    /// A WAL record, checkpoint frame or indexed value failed to
    /// decode. Fatal.
    CorruptRecord(String),
    /// Disk or database failure. Retried with bounded backoff on the
    /// mapper's chain-source path, fatal once retries are exhausted.
    Io(String),
    /// Malformed input at an API boundary.
    InvalidArgument(String),
    /// Cooperative cancellation. Non-error termination.
    Canceled,
}

impl ArchiveError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ArchiveError::NotFound(what.into())
    }

    pub fn unavailable(what: impl Into<String>) -> Self {
        ArchiveError::Unavailable(what.into())
    }

    pub fn mismatch(what: impl Into<String>) -> Self {
        ArchiveError::Mismatch(what.into())
    }

    pub fn corrupt(what: impl Into<String>) -> Self {
        ArchiveError::CorruptRecord(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        ArchiveError::InvalidArgument(what.into())
    }

    /// True for the error kinds the mapper retries with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, ArchiveError::Io(_))
    }
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::NotFound(what) => write!(f, "not found: {}", what),
            ArchiveError::Unavailable(what) => write!(f, "unavailable: {}", what),
            ArchiveError::Finished => write!(f, "finished"),
            ArchiveError::Mismatch(what) => write!(f, "state mismatch: {}", what),
            ArchiveError::CorruptRecord(what) => write!(f, "corrupt record: {}", what),
            ArchiveError::Io(what) => write!(f, "io error: {}", what),
            ArchiveError::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            ArchiveError::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::error::Error for ArchiveError {}

impl From<rocksdb::Error> for ArchiveError {
    fn from(err: rocksdb::Error) -> Self {
        ArchiveError::Io(err.to_string())
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Io(err.to_string())
    }
}

impl From<serde_cbor::Error> for ArchiveError {
    fn from(err: serde_cbor::Error) -> Self {
        ArchiveError::CorruptRecord(err.to_string())
    }
}
