//! Checkout error types.

use backend::BackendError;
use thiserror::Error;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Checkout requires a signed-in user.
    #[error("No user is signed in")]
    NotSignedIn,

    /// Checkout requires a non-empty cart.
    #[error("The cart is empty")]
    EmptyCart,

    /// The shipping address was blank.
    #[error("Shipping address is required")]
    EmptyShippingAddress,

    /// A payment is already in flight.
    #[error("A payment is already in progress")]
    PaymentInProgress,

    /// The payment widget failed before producing an outcome.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// A post-payment write step failed.
    #[error("Checkout step '{step}' failed: {source}")]
    StepFailed {
        step: &'static str,
        #[source]
        source: BackendError,
    },

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;
