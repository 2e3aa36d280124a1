//! The checkout orchestrator.
//!
//! Coordinates the one-shot flow from a snapshotted cart through the
//! external payment gateway and into the record store. The write
//! sequence after payment confirmation is not atomic in the backing
//! service; a failed step triggers compensating deletes and stock
//! restores for the steps already completed, in reverse order, with
//! every compensation result logged for reconciliation.

use std::sync::Arc;
use std::time::Instant;

use backend::{Filter, RecordStore, SelectQuery, decode_row};
use common::{OrderId, ProductId, UserId};
use domain::tables::{ORDER_ITEMS, ORDERS, PRODUCTS};
use domain::{CartLine, Money, NewOrder, NewOrderItem, Order, OrderStatus, PaymentStatus};
use serde_json::{Value, json};
use stores::{CartStorage, CartStore, Notifier};
use tokio::sync::RwLock;

use crate::error::{CheckoutError, Result};
use crate::gateway::{PaymentGateway, PaymentOutcome, PaymentRequest};
use crate::steps::{
    STEP_CLEAR_CART, STEP_CREATE_ORDER, STEP_CREATE_ORDER_ITEMS, STEP_DECREMENT_STOCK,
};

/// Merchant identity sent with every payment request.
pub const PRODUCT_IDENTITY: &str = "aura-closet-order";

/// Display name shown in the payment widget.
pub const PRODUCT_NAME: &str = "Aura Closet Order";

/// Where checkout is in its lifecycle.
///
/// The flow is strictly `Idle -> Paying -> Idle`; there is no phase for
/// the post-payment writes, which run to completion (or compensation)
/// before the orchestrator returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutPhase {
    /// No payment in flight; checkout can be started.
    #[default]
    Idle,

    /// The payment widget is open and awaiting an outcome.
    Paying,
}

impl CheckoutPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutPhase::Idle => "idle",
            CheckoutPhase::Paying => "paying",
        }
    }
}

impl std::fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where to send a visitor who cannot check out yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// No signed-in user; send them to sign-in.
    SignIn,

    /// Nothing in the cart; send them back to the cart page.
    Cart,
}

/// The terminal result of a checkout attempt that reached the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Payment confirmed and the order was written.
    Completed { order_id: OrderId },

    /// The gateway reported a failed payment.
    Declined,

    /// The shopper closed the widget without paying.
    Dismissed,
}

/// Orchestrates payment collection and the post-payment write sequence.
pub struct CheckoutOrchestrator<R, G, S>
where
    R: RecordStore,
    G: PaymentGateway,
    S: CartStorage,
{
    records: Arc<R>,
    gateway: Arc<G>,
    cart: Arc<CartStore<S>>,
    notifier: Arc<dyn Notifier>,
    phase: Arc<RwLock<CheckoutPhase>>,
    return_url: String,
}

impl<R, G, S> CheckoutOrchestrator<R, G, S>
where
    R: RecordStore,
    G: PaymentGateway,
    S: CartStorage,
{
    pub fn new(
        records: Arc<R>,
        gateway: Arc<G>,
        cart: Arc<CartStore<S>>,
        notifier: Arc<dyn Notifier>,
        return_url: impl Into<String>,
    ) -> Self {
        Self {
            records,
            gateway,
            cart,
            notifier,
            phase: Arc::new(RwLock::new(CheckoutPhase::Idle)),
            return_url: return_url.into(),
        }
    }

    /// Returns the current checkout phase.
    pub async fn phase(&self) -> CheckoutPhase {
        *self.phase.read().await
    }

    /// Access check for the checkout page: signed-out visitors go to
    /// sign-in, signed-in visitors with an empty cart go back to the
    /// cart page.
    pub async fn guard(&self, user: Option<UserId>) -> Option<Redirect> {
        let Some(user_id) = user else {
            return Some(Redirect::SignIn);
        };
        if self.cart.items(user_id).await.is_empty() {
            return Some(Redirect::Cart);
        }
        None
    }

    /// Runs a full checkout attempt for the user's current cart.
    ///
    /// Input validation happens before the gateway is invoked; a blank
    /// shipping address never opens the payment widget. Exactly one
    /// payment can be in flight per orchestrator.
    #[tracing::instrument(skip(self, shipping_address))]
    pub async fn place_order(
        &self,
        user: Option<UserId>,
        shipping_address: &str,
    ) -> Result<CheckoutOutcome> {
        let Some(user_id) = user else {
            return Err(CheckoutError::NotSignedIn);
        };

        let lines = self.cart.items(user_id).await;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        if shipping_address.trim().is_empty() {
            self.notifier.error("Please enter your shipping address");
            return Err(CheckoutError::EmptyShippingAddress);
        }

        {
            let mut phase = self.phase.write().await;
            if *phase == CheckoutPhase::Paying {
                return Err(CheckoutError::PaymentInProgress);
            }
            *phase = CheckoutPhase::Paying;
        }

        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();

        let total = self.cart.total(user_id).await;
        let request = PaymentRequest {
            amount: total,
            product_identity: PRODUCT_IDENTITY.to_string(),
            product_name: PRODUCT_NAME.to_string(),
            return_url: self.return_url.clone(),
        };

        let outcome = match self.gateway.collect_payment(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.set_idle().await;
                self.notifier.error("Something went wrong. Please try again.");
                return Err(e);
            }
        };

        match outcome {
            PaymentOutcome::Completed(confirmation) => {
                tracing::info!(
                    transaction_id = %confirmation.transaction_id,
                    "payment confirmed, writing order"
                );
                let result = self
                    .fulfill(user_id, &lines, total, shipping_address)
                    .await;
                self.set_idle().await;
                match result {
                    Ok(order_id) => {
                        metrics::counter!("checkout_completed_total").increment(1);
                        metrics::histogram!("checkout_duration_seconds")
                            .record(started.elapsed().as_secs_f64());
                        self.notifier.success("Order placed successfully!");
                        Ok(CheckoutOutcome::Completed { order_id })
                    }
                    Err(e) => {
                        metrics::counter!("checkout_failed_total").increment(1);
                        self.notifier.error("Failed to process order");
                        Err(e)
                    }
                }
            }
            PaymentOutcome::Declined(reason) => {
                tracing::warn!(reason = %reason, "payment declined");
                self.set_idle().await;
                self.notifier.error("Payment failed. Please try again.");
                Ok(CheckoutOutcome::Declined)
            }
            PaymentOutcome::Dismissed => {
                tracing::info!("payment widget dismissed");
                self.set_idle().await;
                Ok(CheckoutOutcome::Dismissed)
            }
        }
    }

    async fn set_idle(&self) {
        *self.phase.write().await = CheckoutPhase::Idle;
    }

    /// The post-payment write sequence. Each forward step records what
    /// it changed so a later failure can undo it.
    async fn fulfill(
        &self,
        user: UserId,
        lines: &[CartLine],
        total: Money,
        shipping_address: &str,
    ) -> Result<OrderId> {
        let new_order = NewOrder {
            user_id: user,
            status: OrderStatus::Processing,
            total_amount: total,
            shipping_address: shipping_address.trim().to_string(),
            payment_status: PaymentStatus::Paid,
        };
        let rows = self
            .records
            .insert(ORDERS, vec![serde_json::to_value(&new_order)?])
            .await
            .map_err(|e| CheckoutError::StepFailed {
                step: STEP_CREATE_ORDER,
                source: e,
            })?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| CheckoutError::StepFailed {
                step: STEP_CREATE_ORDER,
                source: backend::BackendError::RecordStore(
                    "order insert returned no rows".to_string(),
                ),
            })?;
        let order: Order = decode_row(row).map_err(|e| CheckoutError::StepFailed {
            step: STEP_CREATE_ORDER,
            source: e,
        })?;

        let item_rows = lines
            .iter()
            .map(|line| {
                serde_json::to_value(NewOrderItem {
                    order_id: order.id,
                    product_id: line.product.id,
                    quantity: line.quantity,
                    // Price as snapshotted when the line was added, not
                    // the catalog's current price.
                    price_at_time: line.product.price,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if let Err(e) = self.records.insert(ORDER_ITEMS, item_rows).await {
            self.compensate(order.id, false, &[]).await;
            return Err(CheckoutError::StepFailed {
                step: STEP_CREATE_ORDER_ITEMS,
                source: e,
            });
        }

        let mut decremented: Vec<(ProductId, u64)> = Vec::new();
        for line in lines {
            match self.decrement_stock(line).await {
                Ok(prior) => decremented.push((line.product.id, prior)),
                Err(e) => {
                    self.compensate(order.id, true, &decremented).await;
                    return Err(e);
                }
            }
        }

        tracing::debug!(order_id = %order.id, step = STEP_CLEAR_CART, "clearing cart");
        self.cart.clear(Some(user)).await;

        Ok(order.id)
    }

    /// Reads the product's current stock and writes back the decrement,
    /// returning the prior stock for compensation. Read and write are
    /// separate calls, so a concurrent purchase can interleave between
    /// them.
    async fn decrement_stock(&self, line: &CartLine) -> Result<u64> {
        let product_id = line.product.id.to_string();
        let step_failed = |e| CheckoutError::StepFailed {
            step: STEP_DECREMENT_STOCK,
            source: e,
        };

        let rows = self
            .records
            .select(
                PRODUCTS,
                SelectQuery::new().filter(Filter::eq("id", product_id.clone())),
            )
            .await
            .map_err(step_failed)?;
        let prior = rows
            .first()
            .and_then(|row| row.get("stock"))
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                step_failed(backend::BackendError::RecordStore(format!(
                    "product {product_id} has no stock column"
                )))
            })?;

        let next = prior.saturating_sub(u64::from(line.quantity));
        self.records
            .update(
                PRODUCTS,
                json!({ "stock": next }),
                vec![Filter::eq("id", product_id)],
            )
            .await
            .map_err(step_failed)?;

        Ok(prior)
    }

    /// Undoes completed forward steps in reverse order. A failed
    /// compensation is logged and the remaining compensations still
    /// run; the log line carries everything reconciliation needs.
    async fn compensate(
        &self,
        order_id: OrderId,
        items_inserted: bool,
        decremented: &[(ProductId, u64)],
    ) {
        metrics::counter!("checkout_compensations_total").increment(1);
        tracing::warn!(%order_id, "checkout step failed, compensating completed steps");

        for (product_id, prior) in decremented.iter().rev() {
            if let Err(e) = self
                .records
                .update(
                    PRODUCTS,
                    json!({ "stock": prior }),
                    vec![Filter::eq("id", product_id.to_string())],
                )
                .await
            {
                tracing::error!(
                    step = STEP_DECREMENT_STOCK,
                    %order_id,
                    %product_id,
                    prior_stock = prior,
                    error = %e,
                    "stock restore failed, manual reconciliation required"
                );
            }
        }

        if items_inserted
            && let Err(e) = self
                .records
                .delete(
                    ORDER_ITEMS,
                    vec![Filter::eq("order_id", order_id.to_string())],
                )
                .await
        {
            tracing::error!(
                step = STEP_CREATE_ORDER_ITEMS,
                %order_id,
                error = %e,
                "order item cleanup failed, manual reconciliation required"
            );
        }

        if let Err(e) = self
            .records
            .delete(ORDERS, vec![Filter::eq("id", order_id.to_string())])
            .await
        {
            tracing::error!(
                step = STEP_CREATE_ORDER,
                %order_id,
                error = %e,
                "order cleanup failed, manual reconciliation required"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryPaymentGateway, ScriptedOutcome};
    use backend::{InMemoryRecordStore, RecordOp};
    use chrono::Utc;
    use common::CategoryId;
    use domain::Product;
    use stores::{InMemoryCartStorage, RecordingNotifier};

    fn product(stock: u32, price_cents: i64) -> Product {
        Product {
            id: ProductId::new(),
            name: "Linen Shirt".to_string(),
            description: String::new(),
            price: Money::from_cents(price_cents),
            image_url: String::new(),
            category_id: CategoryId::new(),
            size: "M".to_string(),
            stock,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct Fixture {
        records: Arc<InMemoryRecordStore>,
        gateway: Arc<InMemoryPaymentGateway>,
        cart: Arc<CartStore<InMemoryCartStorage>>,
        notifier: RecordingNotifier,
        orchestrator: CheckoutOrchestrator<
            InMemoryRecordStore,
            InMemoryPaymentGateway,
            InMemoryCartStorage,
        >,
    }

    async fn fixture() -> Fixture {
        let records = Arc::new(InMemoryRecordStore::new());
        let gateway = Arc::new(InMemoryPaymentGateway::new());
        let notifier = RecordingNotifier::new();
        let cart = Arc::new(CartStore::new(
            InMemoryCartStorage::new(),
            Arc::new(notifier.clone()),
        ));
        let orchestrator = CheckoutOrchestrator::new(
            records.clone(),
            gateway.clone(),
            cart.clone(),
            Arc::new(notifier.clone()),
            "https://shop.test/orders",
        );
        Fixture {
            records,
            gateway,
            cart,
            notifier,
            orchestrator,
        }
    }

    async fn seed_product(fx: &Fixture, p: &Product) {
        fx.records
            .seed(PRODUCTS, vec![serde_json::to_value(p).unwrap()])
            .await;
    }

    async fn stock_of(fx: &Fixture, id: ProductId) -> u64 {
        fx.records
            .rows(PRODUCTS)
            .await
            .iter()
            .find(|row| row["id"] == json!(id.to_string()))
            .and_then(|row| row["stock"].as_u64())
            .unwrap()
    }

    #[tokio::test]
    async fn test_requires_signed_in_user_and_non_empty_cart() {
        let fx = fixture().await;
        let user = UserId::new();

        assert!(matches!(
            fx.orchestrator.place_order(None, "123 Main St").await,
            Err(CheckoutError::NotSignedIn)
        ));
        assert!(matches!(
            fx.orchestrator.place_order(Some(user), "123 Main St").await,
            Err(CheckoutError::EmptyCart)
        ));
        assert_eq!(fx.gateway.request_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_redirects() {
        let fx = fixture().await;
        let user = UserId::new();
        let p = product(3, 1000);
        seed_product(&fx, &p).await;

        assert_eq!(fx.orchestrator.guard(None).await, Some(Redirect::SignIn));
        assert_eq!(
            fx.orchestrator.guard(Some(user)).await,
            Some(Redirect::Cart)
        );

        fx.cart.add_item(Some(user), &p).await;
        assert_eq!(fx.orchestrator.guard(Some(user)).await, None);
    }

    #[tokio::test]
    async fn test_blank_address_never_opens_the_widget() {
        let fx = fixture().await;
        let user = UserId::new();
        let p = product(3, 1000);
        seed_product(&fx, &p).await;
        fx.cart.add_item(Some(user), &p).await;

        let result = fx.orchestrator.place_order(Some(user), "   ").await;

        assert!(matches!(result, Err(CheckoutError::EmptyShippingAddress)));
        assert!(fx.notifier.has_error("Please enter your shipping address"));
        assert_eq!(fx.gateway.request_count(), 0);
        assert_eq!(fx.orchestrator.phase().await, CheckoutPhase::Idle);
    }

    #[tokio::test]
    async fn test_successful_checkout_writes_order_items_and_stock() {
        let fx = fixture().await;
        let user = UserId::new();
        let p = product(3, 2000);
        seed_product(&fx, &p).await;
        fx.cart.add_item(Some(user), &p).await;
        fx.cart.add_item(Some(user), &p).await;

        let outcome = fx
            .orchestrator
            .place_order(Some(user), "123 Main St")
            .await
            .unwrap();

        let CheckoutOutcome::Completed { order_id } = outcome else {
            panic!("expected completed checkout, got {outcome:?}");
        };

        // Payment was requested for the cart total in minor units.
        assert_eq!(
            fx.gateway.last_request().unwrap().amount,
            Money::from_cents(4000)
        );

        let orders = fx.records.rows(ORDERS).await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["id"], json!(order_id.to_string()));
        assert_eq!(orders[0]["total_amount"], json!(4000));
        assert_eq!(orders[0]["status"], json!("processing"));
        assert_eq!(orders[0]["payment_status"], json!("paid"));
        assert_eq!(orders[0]["shipping_address"], json!("123 Main St"));

        let items = fx.records.rows(ORDER_ITEMS).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["order_id"], json!(order_id.to_string()));
        assert_eq!(items[0]["quantity"], json!(2));
        assert_eq!(items[0]["price_at_time"], json!(2000));

        assert_eq!(stock_of(&fx, p.id).await, 1);
        assert!(fx.cart.items(user).await.is_empty());
        assert!(fx.notifier.has_success("Order placed successfully!"));
        assert_eq!(fx.orchestrator.phase().await, CheckoutPhase::Idle);
    }

    #[tokio::test]
    async fn test_order_items_carry_the_add_time_price() {
        let fx = fixture().await;
        let user = UserId::new();
        let p = product(3, 2000);
        seed_product(&fx, &p).await;
        fx.cart.add_item(Some(user), &p).await;

        // Catalog price changes after the line was added.
        fx.records
            .update(
                PRODUCTS,
                json!({ "price": 9999 }),
                vec![Filter::eq("id", p.id.to_string())],
            )
            .await
            .unwrap();

        fx.orchestrator
            .place_order(Some(user), "123 Main St")
            .await
            .unwrap();

        let items = fx.records.rows(ORDER_ITEMS).await;
        assert_eq!(items[0]["price_at_time"], json!(2000));
    }

    #[tokio::test]
    async fn test_declined_payment_leaves_everything_untouched() {
        let fx = fixture().await;
        let user = UserId::new();
        let p = product(3, 1000);
        seed_product(&fx, &p).await;
        fx.cart.add_item(Some(user), &p).await;
        fx.gateway.set_outcome(ScriptedOutcome::Decline);

        let outcome = fx
            .orchestrator
            .place_order(Some(user), "123 Main St")
            .await
            .unwrap();

        assert_eq!(outcome, CheckoutOutcome::Declined);
        assert!(fx.notifier.has_error("Payment failed. Please try again."));
        assert_eq!(fx.records.row_count(ORDERS).await, 0);
        assert_eq!(stock_of(&fx, p.id).await, 3);
        assert_eq!(fx.cart.items(user).await.len(), 1);

        // A retry after the decline goes through.
        fx.gateway.set_outcome(ScriptedOutcome::Approve);
        let outcome = fx
            .orchestrator
            .place_order(Some(user), "123 Main St")
            .await
            .unwrap();
        assert!(matches!(outcome, CheckoutOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_dismissed_widget_is_not_an_error() {
        let fx = fixture().await;
        let user = UserId::new();
        let p = product(3, 1000);
        seed_product(&fx, &p).await;
        fx.cart.add_item(Some(user), &p).await;
        fx.gateway.set_outcome(ScriptedOutcome::Dismiss);

        let outcome = fx
            .orchestrator
            .place_order(Some(user), "123 Main St")
            .await
            .unwrap();

        assert_eq!(outcome, CheckoutOutcome::Dismissed);
        assert_eq!(fx.records.row_count(ORDERS).await, 0);
        assert_eq!(fx.cart.items(user).await.len(), 1);
        assert_eq!(fx.orchestrator.phase().await, CheckoutPhase::Idle);
    }

    #[tokio::test]
    async fn test_gateway_failure_resets_phase() {
        let fx = fixture().await;
        let user = UserId::new();
        let p = product(3, 1000);
        seed_product(&fx, &p).await;
        fx.cart.add_item(Some(user), &p).await;
        fx.gateway.set_fail_on_show(true);

        let result = fx.orchestrator.place_order(Some(user), "123 Main St").await;

        assert!(matches!(result, Err(CheckoutError::Gateway(_))));
        assert!(
            fx.notifier
                .has_error("Something went wrong. Please try again.")
        );
        assert_eq!(fx.orchestrator.phase().await, CheckoutPhase::Idle);
    }

    #[tokio::test]
    async fn test_failed_item_insert_compensates_the_order() {
        let fx = fixture().await;
        let user = UserId::new();
        let p = product(3, 1000);
        seed_product(&fx, &p).await;
        fx.cart.add_item(Some(user), &p).await;
        fx.records
            .set_fail_on(RecordOp::Insert, ORDER_ITEMS, true)
            .await;

        let result = fx.orchestrator.place_order(Some(user), "123 Main St").await;

        assert!(matches!(
            result,
            Err(CheckoutError::StepFailed {
                step: STEP_CREATE_ORDER_ITEMS,
                ..
            })
        ));
        assert!(fx.notifier.has_error("Failed to process order"));
        // The order row written before the failure was deleted again.
        assert_eq!(fx.records.row_count(ORDERS).await, 0);
        assert_eq!(stock_of(&fx, p.id).await, 3);
        // The cart survives; the shopper can retry.
        assert_eq!(fx.cart.items(user).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_stock_update_compensates_order_and_items() {
        let fx = fixture().await;
        let user = UserId::new();
        let p = product(3, 1000);
        seed_product(&fx, &p).await;
        fx.cart.add_item(Some(user), &p).await;
        fx.records
            .set_fail_on(RecordOp::Update, PRODUCTS, true)
            .await;

        let result = fx.orchestrator.place_order(Some(user), "123 Main St").await;

        assert!(matches!(
            result,
            Err(CheckoutError::StepFailed {
                step: STEP_DECREMENT_STOCK,
                ..
            })
        ));
        assert_eq!(fx.records.row_count(ORDERS).await, 0);
        assert_eq!(fx.records.row_count(ORDER_ITEMS).await, 0);
        assert_eq!(fx.cart.items(user).await.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_stock_decrement_is_restored() {
        let fx = fixture().await;
        let user = UserId::new();
        let first = product(5, 1000);
        let second = product(5, 2000);
        seed_product(&fx, &first).await;
        // The second product's row has no stock column, so its
        // decrement fails after the first succeeded.
        let mut broken = serde_json::to_value(&second).unwrap();
        broken.as_object_mut().unwrap().remove("stock");
        fx.records.seed(PRODUCTS, vec![broken]).await;
        fx.cart.add_item(Some(user), &first).await;
        fx.cart.add_item(Some(user), &second).await;

        let result = fx.orchestrator.place_order(Some(user), "123 Main St").await;

        assert!(matches!(
            result,
            Err(CheckoutError::StepFailed {
                step: STEP_DECREMENT_STOCK,
                ..
            })
        ));
        // The first product's decrement was rolled back.
        assert_eq!(stock_of(&fx, first.id).await, 5);
        assert_eq!(fx.records.row_count(ORDERS).await, 0);
        assert_eq!(fx.records.row_count(ORDER_ITEMS).await, 0);
        assert_eq!(fx.cart.items(user).await.len(), 2);
    }

    #[tokio::test]
    async fn test_phase_display() {
        assert_eq!(CheckoutPhase::Idle.to_string(), "idle");
        assert_eq!(CheckoutPhase::Paying.to_string(), "paying");
    }
}
