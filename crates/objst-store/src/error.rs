//! Error type for store operations

/// Error type for key-value store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("redb compaction error: {0}")]
    Compaction(#[from] redb::CompactionError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store busy: {0}")]
    Unavailable(String),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<StoreError> for objst_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => Self::StorageUnavailable(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
