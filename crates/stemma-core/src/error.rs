use thiserror::Error;

pub type Result<T> = std::result::Result<T, StemmaError>;

#[derive(Debug, Error)]
pub enum StemmaError {
    #[error("Storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage operation error: {0}")]
    StorageOperation(#[from] redb::StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Duplicate record: {0}")]
    DuplicateRecord(String),

    #[error("Invalid record id: {0:?}")]
    InvalidXref(String),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
