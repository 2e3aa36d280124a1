//! Domain error types.

use thiserror::Error;

/// Errors raised by domain-level validation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A product failed validation before being written to the catalog.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),
}
