//! Catalog and order persistence boundary.
//!
//! Services talk to storage only through [`CatalogStore`] and the
//! transactions it hands out. Every write happens inside a [`StoreTx`]; a
//! transaction that is dropped without `commit` leaves no trace.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{FailPoint, InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use r#trait::{CatalogStore, StoreError, StoreTx};
