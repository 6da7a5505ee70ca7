// src/error/types.rs
use thiserror::Error;

/// Errors raised by a data context.
///
/// The repository layer passes these through unchanged, apart from
/// `Cancelled`, which surfaces as [`RepositoryError::Cancelled`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("Row {key} in {collection} was expected to exist but did not")]
    RowMissing { collection: String, key: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Data context has been disposed")]
    Disposed,

    #[error("Transaction has already been completed")]
    TransactionClosed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Pool(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

/// Errors surfaced by repositories, the unit of work and the binder.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => RepositoryError::Cancelled,
            other => RepositoryError::Store(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type RepoResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_store_error_maps_to_cancelled() {
        let err: RepositoryError = StoreError::Cancelled.into();
        assert!(matches!(err, RepositoryError::Cancelled));
    }

    #[test]
    fn test_store_errors_pass_through_unchanged() {
        let err: RepositoryError = StoreError::Disposed.into();
        assert!(matches!(err, RepositoryError::Store(StoreError::Disposed)));
        assert_eq!(err.to_string(), "Data context has been disposed");
    }
}
