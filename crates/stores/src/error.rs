//! Store error types.

use thiserror::Error;

/// Errors that can occur in the client-side stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An external backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] backend::BackendError),

    /// Domain validation failed.
    #[error("Domain error: {0}")]
    Domain(#[from] domain::DomainError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cart persistence I/O failed.
    #[error("Persistence error: {0}")]
    Io(#[from] std::io::Error),
}
