//! Checkout orchestration for the storefront.
//!
//! A one-shot flow: snapshot the cart, hand the total to the external
//! payment gateway, and on confirmation run the post-payment write
//! sequence against the record store:
//! 1. Insert the order row
//! 2. Batch-insert its line items (price snapshotted at add-time)
//! 3. Decrement product stock per line
//! 4. Clear the user's cart
//!
//! The sequence has no atomic commit in the backing service, so a
//! failed forward step triggers compensating actions for the steps
//! already completed, in reverse order, and every compensation result
//! is logged for manual reconciliation.

pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod steps;

pub use error::CheckoutError;
pub use gateway::{
    InMemoryPaymentGateway, PaymentConfirmation, PaymentGateway, PaymentOutcome, PaymentRequest,
    ScriptedOutcome,
};
pub use orchestrator::{CheckoutOrchestrator, CheckoutOutcome, CheckoutPhase, Redirect};
