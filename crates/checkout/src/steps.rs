//! Step names for the post-payment write sequence.
//!
//! The forward steps run in this order; compensation runs in reverse
//! over whichever steps had completed when a failure occurred.

/// Insert the order row.
pub const STEP_CREATE_ORDER: &str = "create_order";

/// Batch-insert the order's line items.
pub const STEP_CREATE_ORDER_ITEMS: &str = "create_order_items";

/// Write back `stock - quantity` per cart line.
pub const STEP_DECREMENT_STOCK: &str = "decrement_stock";

/// Empty the user's cart.
pub const STEP_CLEAR_CART: &str = "clear_cart";
