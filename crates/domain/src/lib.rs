//! Domain records for the storefront: catalog products and categories,
//! cart line items, orders, and user profiles.
//!
//! Everything here is a plain value type. Ownership of the data lives in
//! the backing record store; these types are the client-side shapes the
//! stores and the checkout flow exchange with it.

pub mod cart;
pub mod error;
pub mod money;
pub mod order;
pub mod product;
pub mod tables;
pub mod user;

pub use cart::CartLine;
pub use error::DomainError;
pub use money::Money;
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, PaymentStatus};
pub use product::{Category, NewProduct, Product, ProductPatch};
pub use user::{Profile, Role, UserProfile};
