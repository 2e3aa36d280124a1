//! The cart store: per-user line items with persistence across sessions.
//!
//! The cart is keyed by user identity; switching identities yields a
//! disjoint view and anonymous operations fail closed. The whole map is
//! persisted after every mutation with last-write-wins semantics —
//! concurrent carts for the same identity on other devices are not
//! coordinated (an open requirements question, deliberately not solved
//! here with a locking protocol).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ProductId, UserId};
use domain::{CartLine, Money, Product};
use tokio::sync::{RwLock, watch};

use crate::error::StoreError;
use crate::notify::Notifier;
use crate::signal::ChangeSignal;

/// The persisted shape: every user's line items.
pub type CartMap = HashMap<UserId, Vec<CartLine>>;

/// Persistence for the cart map.
///
/// Saves are whole-map and last-write-wins, mirroring the local-storage
/// persistence the cart survives process restarts through.
#[async_trait]
pub trait CartStorage: Send + Sync {
    /// Loads the persisted cart map; empty when nothing was saved yet.
    async fn load(&self) -> Result<CartMap, StoreError>;

    /// Persists the cart map.
    async fn save(&self, carts: &CartMap) -> Result<(), StoreError>;
}

/// In-memory cart storage for tests; survives store re-creation as long
/// as the storage handle is shared.
#[derive(Clone, Default)]
pub struct InMemoryCartStorage {
    state: Arc<std::sync::RwLock<CartMap>>,
}

impl InMemoryCartStorage {
    /// Creates empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStorage for InMemoryCartStorage {
    async fn load(&self) -> Result<CartMap, StoreError> {
        Ok(self.state.read().unwrap().clone())
    }

    async fn save(&self, carts: &CartMap) -> Result<(), StoreError> {
        *self.state.write().unwrap() = carts.clone();
        Ok(())
    }
}

/// JSON-file cart storage.
#[derive(Clone)]
pub struct JsonFileCartStorage {
    path: PathBuf,
}

impl JsonFileCartStorage {
    /// Creates storage backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CartStorage for JsonFileCartStorage {
    async fn load(&self) -> Result<CartMap, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CartMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, carts: &CartMap) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(carts)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

/// State container for per-user carts.
pub struct CartStore<S: CartStorage> {
    storage: S,
    notifier: Arc<dyn Notifier>,
    state: Arc<RwLock<CartMap>>,
    signal: ChangeSignal,
}

impl<S: CartStorage> CartStore<S> {
    /// Creates an empty cart store over the given persistence.
    pub fn new(storage: S, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            storage,
            notifier,
            state: Arc::new(RwLock::new(CartMap::new())),
            signal: ChangeSignal::new(),
        }
    }

    /// Hydrates the store from persistence.
    pub async fn load(&self) -> Result<(), StoreError> {
        let carts = self.storage.load().await?;
        *self.state.write().await = carts;
        self.signal.notify();
        Ok(())
    }

    /// Subscribes to cart changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.signal.subscribe()
    }

    /// Adds one unit of the product to the user's cart.
    ///
    /// An existing line is incremented only while its quantity is below
    /// the product's stock as known at add-time; the stock bound is not
    /// re-validated against later catalog changes. Without a signed-in
    /// user the call fails closed with a notice.
    #[tracing::instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_item(&self, user: Option<UserId>, product: &Product) {
        let Some(user_id) = user else {
            self.notifier.error("Please sign in to add items to cart");
            return;
        };

        {
            let mut state = self.state.write().await;
            let lines = state.entry(user_id).or_default();

            if let Some(line) = lines.iter_mut().find(|l| l.product.id == product.id) {
                if line.quantity < line.product.stock {
                    line.quantity += 1;
                } else {
                    self.notifier.error("No more stock available");
                    metrics::counter!("cart_add_out_of_stock_total").increment(1);
                    return;
                }
            } else {
                lines.push(CartLine::new(product.clone()));
            }
        }

        metrics::counter!("cart_items_added_total").increment(1);
        self.notifier.success("Item added to cart");
        self.after_mutation().await;
    }

    /// Removes the line item for the product, if present.
    ///
    /// Notifies success unconditionally, matching the storefront's
    /// existing behavior even when no such line existed.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user: Option<UserId>, product_id: ProductId) {
        let Some(user_id) = user else {
            return;
        };

        {
            let mut state = self.state.write().await;
            if let Some(lines) = state.get_mut(&user_id) {
                lines.retain(|l| l.product.id != product_id);
            }
        }

        self.notifier.success("Item removed from cart");
        self.after_mutation().await;
    }

    /// Sets the quantity of the product's line item.
    ///
    /// No lower-bound or stock-bound validation happens here; the entry
    /// point trusts the caller's input constraints.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(&self, user: Option<UserId>, product_id: ProductId, quantity: u32) {
        let Some(user_id) = user else {
            return;
        };

        {
            let mut state = self.state.write().await;
            if let Some(lines) = state.get_mut(&user_id) {
                for line in lines.iter_mut() {
                    if line.product.id == product_id {
                        line.quantity = quantity;
                    }
                }
            }
        }

        self.after_mutation().await;
    }

    /// Empties the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user: Option<UserId>) {
        let Some(user_id) = user else {
            return;
        };

        self.state.write().await.insert(user_id, Vec::new());
        self.after_mutation().await;
    }

    /// Returns a snapshot of the user's line items.
    pub async fn items(&self, user: UserId) -> Vec<CartLine> {
        self.state
            .read()
            .await
            .get(&user)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the sum of `price * quantity` over the user's lines,
    /// recomputed on every read.
    pub async fn total(&self, user: UserId) -> Money {
        self.state
            .read()
            .await
            .get(&user)
            .map(|lines| lines.iter().map(CartLine::line_total).sum())
            .unwrap_or_else(Money::zero)
    }

    async fn after_mutation(&self) {
        self.signal.notify();
        let snapshot = self.state.read().await.clone();
        if let Err(e) = self.storage.save(&snapshot).await {
            // The mutation itself stands; persistence is best-effort
            // last-write-wins.
            tracing::warn!(error = %e, "failed to persist cart");
        }
    }
}
