//! Client-side state containers for the storefront.
//!
//! Each store is an explicit state container: constructed with its
//! collaborators, read through snapshots, mutated through named
//! operations, and observed through a [`ChangeSignal`] subscription.
//! There are no ambient globals; composition happens at wiring time.
//!
//! User-facing messages (the toast layer in the UI) go through the
//! [`Notifier`] trait so stores stay presentation-agnostic and tests
//! can assert on emitted notices.

pub mod cart;
pub mod catalog;
pub mod error;
pub mod notify;
pub mod orders;
pub mod session;
pub mod signal;

pub use cart::{CartMap, CartStorage, CartStore, InMemoryCartStorage, JsonFileCartStorage};
pub use catalog::CatalogStore;
pub use error::StoreError;
pub use notify::{Notice, NoticeLevel, Notifier, RecordingNotifier, TracingNotifier};
pub use orders::{OrderHistoryStore, OrderLineView, OrderSummary};
pub use session::SessionStore;
pub use signal::ChangeSignal;
