//! Backend error types.

use thiserror::Error;

/// Errors that can occur when calling the external backend services.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A database error occurred in the Postgres record store.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The auth provider rejected the supplied credentials.
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// A generic auth provider failure.
    #[error("Auth error: {0}")]
    Auth(String),

    /// An object store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A generic record store failure carrying the service's message.
    #[error("Record store error: {0}")]
    RecordStore(String),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
