//! Cart line items.

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::product::Product;

/// A (product, quantity) pair within a user's cart.
///
/// The embedded product is a snapshot taken when the line was created;
/// its price and stock reflect the catalog at add-time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

impl CartLine {
    /// Creates a line with quantity 1 for a freshly added product.
    pub fn new(product: Product) -> Self {
        Self {
            product,
            quantity: 1,
        }
    }

    /// Returns `price * quantity` for this line.
    pub fn line_total(&self) -> Money {
        self.product.price.multiply(self.quantity)
    }
}
