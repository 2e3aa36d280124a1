//! The catalog store: product and category listings plus the selected
//! category filter, fetched on demand from the record store.

use std::sync::Arc;

use backend::{Filter, OrderBy, RecordStore, SelectQuery, decode_rows};
use common::{CategoryId, ProductId};
use domain::{Category, NewProduct, Product, ProductPatch, tables};
use tokio::sync::{RwLock, watch};

use crate::notify::Notifier;
use crate::signal::ChangeSignal;

#[derive(Default)]
struct CatalogState {
    products: Vec<Product>,
    categories: Vec<Category>,
    selected_category: Option<CategoryId>,
    loading: bool,
}

/// State container for the product catalog.
///
/// Admin mutations (`add_product`, `update_product`, `delete_product`)
/// write through to the record store and refetch; the role gate lives
/// at the routing layer, not here.
pub struct CatalogStore<R: RecordStore> {
    records: R,
    notifier: Arc<dyn Notifier>,
    state: Arc<RwLock<CatalogState>>,
    signal: ChangeSignal,
}

impl<R: RecordStore> CatalogStore<R> {
    /// Creates an empty catalog store.
    pub fn new(records: R, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            records,
            notifier,
            state: Arc::new(RwLock::new(CatalogState::default())),
            signal: ChangeSignal::new(),
        }
    }

    /// Subscribes to catalog changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.signal.subscribe()
    }

    /// Fetches products, filtered by the selected category, newest
    /// first. Failures surface as an error notice.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_products(&self) {
        let selected = {
            let mut state = self.state.write().await;
            state.loading = true;
            state.selected_category
        };
        self.signal.notify();

        let mut query = SelectQuery::new().order(OrderBy::desc("created_at"));
        if let Some(category_id) = selected {
            query = query.filter(Filter::eq("category_id", category_id.to_string()));
        }

        match self.records.select(tables::PRODUCTS, query).await {
            Ok(rows) => match decode_rows::<Product>(rows) {
                Ok(products) => {
                    self.state.write().await.products = products;
                }
                Err(e) => self.notifier.error(&e.to_string()),
            },
            Err(e) => self.notifier.error(&e.to_string()),
        }

        self.state.write().await.loading = false;
        self.signal.notify();
    }

    /// Fetches categories ordered by name.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_categories(&self) {
        let query = SelectQuery::new().order(OrderBy::asc("name"));
        match self.records.select(tables::CATEGORIES, query).await {
            Ok(rows) => match decode_rows::<Category>(rows) {
                Ok(categories) => {
                    self.state.write().await.categories = categories;
                    self.signal.notify();
                }
                Err(e) => self.notifier.error(&e.to_string()),
            },
            Err(e) => self.notifier.error(&e.to_string()),
        }
    }

    /// Sets the category filter and refetches products.
    pub async fn set_selected_category(&self, category_id: Option<CategoryId>) {
        self.state.write().await.selected_category = category_id;
        self.fetch_products().await;
    }

    /// Adds a product to the catalog (admin operation).
    #[tracing::instrument(skip(self, product))]
    pub async fn add_product(&self, product: NewProduct) {
        if let Err(e) = product.validate() {
            self.notifier.error(&e.to_string());
            return;
        }

        let row = match serde_json::to_value(&product) {
            Ok(row) => row,
            Err(e) => {
                self.notifier.error(&e.to_string());
                return;
            }
        };

        match self.records.insert(tables::PRODUCTS, vec![row]).await {
            Ok(_) => {
                self.notifier.success("Product added successfully");
                self.fetch_products().await;
            }
            Err(e) => self.notifier.error(&e.to_string()),
        }
    }

    /// Applies a partial update to a product (admin operation).
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_product(&self, id: ProductId, patch: ProductPatch) {
        let patch = match serde_json::to_value(&patch) {
            Ok(patch) => patch,
            Err(e) => {
                self.notifier.error(&e.to_string());
                return;
            }
        };

        let filters = vec![Filter::eq("id", id.to_string())];
        match self.records.update(tables::PRODUCTS, patch, filters).await {
            Ok(_) => {
                self.notifier.success("Product updated successfully");
                self.fetch_products().await;
            }
            Err(e) => self.notifier.error(&e.to_string()),
        }
    }

    /// Removes a product from the catalog (admin operation).
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) {
        let filters = vec![Filter::eq("id", id.to_string())];
        match self.records.delete(tables::PRODUCTS, filters).await {
            Ok(_) => {
                self.notifier.success("Product deleted successfully");
                self.fetch_products().await;
            }
            Err(e) => self.notifier.error(&e.to_string()),
        }
    }

    /// Returns a snapshot of the fetched products.
    pub async fn products(&self) -> Vec<Product> {
        self.state.read().await.products.clone()
    }

    /// Returns a snapshot of the fetched categories.
    pub async fn categories(&self) -> Vec<Category> {
        self.state.read().await.categories.clone()
    }

    /// Returns the selected category filter.
    pub async fn selected_category(&self) -> Option<CategoryId> {
        self.state.read().await.selected_category
    }

    /// Returns true while a product fetch is in flight.
    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use backend::{InMemoryRecordStore, RecordOp};
    use domain::Money;
    use serde_json::json;

    fn seed_product(name: &str, category_id: CategoryId, created_at: &str) -> serde_json::Value {
        json!({
            "name": name,
            "description": "",
            "price": 1000,
            "image_url": "",
            "category_id": category_id.to_string(),
            "size": "M",
            "stock": 5,
            "created_at": created_at,
            "updated_at": created_at,
        })
    }

    fn setup() -> (CatalogStore<InMemoryRecordStore>, InMemoryRecordStore, RecordingNotifier) {
        let records = InMemoryRecordStore::new();
        let notifier = RecordingNotifier::new();
        let store = CatalogStore::new(records.clone(), Arc::new(notifier.clone()));
        (store, records, notifier)
    }

    #[tokio::test]
    async fn test_fetch_products_newest_first() {
        let (store, records, _) = setup();
        let cat = CategoryId::new();
        records
            .seed(
                tables::PRODUCTS,
                vec![
                    seed_product("older", cat, "2024-01-01T00:00:00Z"),
                    seed_product("newer", cat, "2024-06-01T00:00:00Z"),
                ],
            )
            .await;

        store.fetch_products().await;

        let products = store.products().await;
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "newer");
        assert!(!store.is_loading().await);
    }

    #[tokio::test]
    async fn test_category_filter() {
        let (store, records, _) = setup();
        let tops = CategoryId::new();
        let shoes = CategoryId::new();
        records
            .seed(
                tables::PRODUCTS,
                vec![
                    seed_product("shirt", tops, "2024-01-01T00:00:00Z"),
                    seed_product("sneaker", shoes, "2024-01-02T00:00:00Z"),
                ],
            )
            .await;

        store.set_selected_category(Some(tops)).await;

        let products = store.products().await;
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "shirt");

        store.set_selected_category(None).await;
        assert_eq!(store.products().await.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_notifies() {
        let (store, records, notifier) = setup();
        records
            .set_fail_on(RecordOp::Select, tables::PRODUCTS, true)
            .await;

        store.fetch_products().await;

        assert!(store.products().await.is_empty());
        assert!(!notifier.notices().is_empty());
        assert!(!store.is_loading().await);
    }

    #[tokio::test]
    async fn test_add_product_validates() {
        let (store, records, notifier) = setup();

        store
            .add_product(NewProduct {
                name: "  ".to_string(),
                description: String::new(),
                price: Money::from_cents(100),
                image_url: String::new(),
                category_id: CategoryId::new(),
                size: "S".to_string(),
                stock: 1,
            })
            .await;

        assert_eq!(records.row_count(tables::PRODUCTS).await, 0);
        assert!(!notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_admin_add_update_delete() {
        let (store, records, notifier) = setup();

        store
            .add_product(NewProduct {
                name: "Denim Jacket".to_string(),
                description: "Blue".to_string(),
                price: Money::from_cents(5500),
                image_url: String::new(),
                category_id: CategoryId::new(),
                size: "L".to_string(),
                stock: 2,
            })
            .await;
        assert!(notifier.has_success("Product added successfully"));
        let id = store.products().await[0].id;

        store
            .update_product(
                id,
                ProductPatch {
                    stock: Some(7),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(store.products().await[0].stock, 7);

        store.delete_product(id).await;
        assert_eq!(records.row_count(tables::PRODUCTS).await, 0);
    }

    #[tokio::test]
    async fn test_fetch_categories_sorted_by_name() {
        let (store, records, _) = setup();
        records
            .seed(
                tables::CATEGORIES,
                vec![
                    json!({ "name": "Tops", "slug": "tops" }),
                    json!({ "name": "Accessories", "slug": "accessories" }),
                ],
            )
            .await;

        store.fetch_categories().await;

        let categories = store.categories().await;
        assert_eq!(categories[0].name, "Accessories");
        assert_eq!(categories[1].name, "Tops");
    }
}
