//! Payment gateway trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::Money;

use crate::error::{CheckoutError, Result};

/// The configuration handed to the payment widget.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    /// Charge amount; gateways take minor units (`amount.minor_units()`).
    pub amount: Money,
    /// Merchant-side identity for the charge.
    pub product_identity: String,
    /// Display name shown in the widget.
    pub product_name: String,
    /// Where the widget returns the shopper afterwards.
    pub return_url: String,
}

/// Confirmation payload delivered on a successful payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmation {
    pub transaction_id: String,
}

/// The single outcome of presenting the payment widget.
///
/// `Completed` and `Declined` are mutually exclusive; `Dismissed` means
/// the shopper closed the widget before either could fire.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Completed(PaymentConfirmation),
    Declined(String),
    Dismissed,
}

/// Trait for the external payment widget.
///
/// There is no timeout: the call resolves whenever the shopper
/// completes, fails, or dismisses the widget.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Presents the widget and resolves with exactly one outcome.
    async fn collect_payment(&self, request: PaymentRequest) -> Result<PaymentOutcome>;
}

/// What the in-memory gateway should do with the next payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptedOutcome {
    /// Confirm the payment.
    #[default]
    Approve,
    /// Fail the payment.
    Decline,
    /// The shopper closes the widget without paying.
    Dismiss,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    script: ScriptedOutcome,
    requests: Vec<PaymentRequest>,
    next_txn: u32,
    fail_on_show: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a gateway that approves every payment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outcome of subsequent payments.
    pub fn set_outcome(&self, outcome: ScriptedOutcome) {
        self.state.write().unwrap().script = outcome;
    }

    /// Configures the gateway to error before producing an outcome,
    /// simulating a widget that fails to load.
    pub fn set_fail_on_show(&self, fail: bool) {
        self.state.write().unwrap().fail_on_show = fail;
    }

    /// Returns the number of payment requests presented.
    pub fn request_count(&self) -> usize {
        self.state.read().unwrap().requests.len()
    }

    /// Returns the most recent payment request, if any.
    pub fn last_request(&self) -> Option<PaymentRequest> {
        self.state.read().unwrap().requests.last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn collect_payment(&self, request: PaymentRequest) -> Result<PaymentOutcome> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_show {
            return Err(CheckoutError::Gateway("widget failed to load".to_string()));
        }

        state.requests.push(request);
        match state.script {
            ScriptedOutcome::Approve => {
                state.next_txn += 1;
                Ok(PaymentOutcome::Completed(PaymentConfirmation {
                    transaction_id: format!("TXN-{:04}", state.next_txn),
                }))
            }
            ScriptedOutcome::Decline => {
                Ok(PaymentOutcome::Declined("insufficient funds".to_string()))
            }
            ScriptedOutcome::Dismiss => Ok(PaymentOutcome::Dismissed),
        }
    }
}
