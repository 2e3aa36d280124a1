//! Logical table names in the backing record store.

/// Catalog products.
pub const PRODUCTS: &str = "products";

/// Catalog categories.
pub const CATEGORIES: &str = "categories";

/// Placed orders.
pub const ORDERS: &str = "orders";

/// Line items belonging to placed orders.
pub const ORDER_ITEMS: &str = "order_items";

/// User profile rows keyed by the auth provider's user ID.
pub const PROFILES: &str = "profiles";
