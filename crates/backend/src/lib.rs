//! Client bindings for the external backend services the storefront
//! delegates to: a generic record store (CRUD over named tables), an
//! auth provider (sessions, credential exchange, change stream), and an
//! object store (upload + public URL).
//!
//! Each collaborator is a trait. In-memory implementations back the test
//! suite; [`PostgresRecordStore`] is the deployable stand-in for the
//! hosted record store.

pub mod auth;
pub mod config;
pub mod error;
pub mod memory;
pub mod object;
pub mod postgres;
pub mod record;

pub use auth::{AuthProvider, InMemoryAuthProvider, Session, SessionStream};
pub use config::BackendConfig;
pub use error::{BackendError, Result};
pub use memory::InMemoryRecordStore;
pub use object::{InMemoryObjectStore, ObjectStore};
pub use postgres::PostgresRecordStore;
pub use record::{
    Filter, JoinSpec, OrderBy, RecordOp, RecordStore, SelectQuery, decode_row, decode_rows,
};
