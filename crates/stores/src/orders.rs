//! Order history: a user's placed orders with their line items and
//! product display data.

use std::collections::HashMap;
use std::sync::Arc;

use backend::{Filter, JoinSpec, OrderBy, RecordStore, SelectQuery, decode_row};
use common::{ProductId, UserId};
use domain::{Money, Order, Product, tables};
use serde_json::Value;
use tokio::sync::{RwLock, watch};

use crate::error::StoreError;
use crate::notify::Notifier;
use crate::signal::ChangeSignal;

/// A line item of a past order, with the product fields the history
/// view renders. `price_at_time` is the snapshot taken at checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLineView {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_at_time: Money,
    pub product_name: String,
    pub product_image_url: String,
}

/// An order with its line items.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub order: Order,
    pub items: Vec<OrderLineView>,
}

/// State container for a user's order history.
pub struct OrderHistoryStore<R: RecordStore> {
    records: R,
    notifier: Arc<dyn Notifier>,
    state: Arc<RwLock<Vec<OrderSummary>>>,
    signal: ChangeSignal,
}

impl<R: RecordStore> OrderHistoryStore<R> {
    /// Creates an empty order history store.
    pub fn new(records: R, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            records,
            notifier,
            state: Arc::new(RwLock::new(Vec::new())),
            signal: ChangeSignal::new(),
        }
    }

    /// Subscribes to history changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.signal.subscribe()
    }

    /// Fetches the user's orders, newest first, with embedded items.
    ///
    /// Without a signed-in user this is a no-op; the history view shows
    /// its sign-in prompt instead.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_orders(&self, user: Option<UserId>) {
        let Some(user_id) = user else {
            return;
        };

        match self.load_summaries(user_id).await {
            Ok(summaries) => {
                *self.state.write().await = summaries;
                self.signal.notify();
            }
            Err(e) => {
                tracing::error!(error = %e, %user_id, "order history fetch failed");
                self.notifier.error("Failed to fetch orders");
            }
        }
    }

    /// Returns a snapshot of the fetched order summaries.
    pub async fn orders(&self) -> Vec<OrderSummary> {
        self.state.read().await.clone()
    }

    async fn load_summaries(&self, user_id: UserId) -> Result<Vec<OrderSummary>, StoreError> {
        let query = SelectQuery::new()
            .filter(Filter::eq("user_id", user_id.to_string()))
            .order(OrderBy::desc("created_at"))
            .join(JoinSpec::many(tables::ORDER_ITEMS, "order_id", "id", "items"));
        let rows = self.records.select(tables::ORDERS, query).await?;

        let mut product_cache: HashMap<ProductId, Option<Product>> = HashMap::new();
        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let item_rows = row
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let order: Order = decode_row(row)?;

            let mut items = Vec::with_capacity(item_rows.len());
            for item_row in item_rows {
                let product_id: ProductId =
                    serde_json::from_value(item_row["product_id"].clone())?;
                let quantity: u32 = serde_json::from_value(item_row["quantity"].clone())?;
                let price_at_time: Money =
                    serde_json::from_value(item_row["price_at_time"].clone())?;

                let product = match product_cache.get(&product_id) {
                    Some(cached) => cached.clone(),
                    None => {
                        let found = self.find_product(product_id).await?;
                        product_cache.insert(product_id, found.clone());
                        found
                    }
                };

                let (product_name, product_image_url) = product
                    .map(|p| (p.name, p.image_url))
                    .unwrap_or_default();
                items.push(OrderLineView {
                    product_id,
                    quantity,
                    price_at_time,
                    product_name,
                    product_image_url,
                });
            }

            summaries.push(OrderSummary { order, items });
        }
        Ok(summaries)
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let query = SelectQuery::new().filter(Filter::eq("id", id.to_string()));
        let rows = self.records.select(tables::PRODUCTS, query).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(decode_row(row)?)),
            None => Ok(None),
        }
    }
}
