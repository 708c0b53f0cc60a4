//! Orders domain module.
//!
//! This crate contains business rules for placing orders and describing them
//! afterwards, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage).

pub mod customer;
pub mod order;
pub mod snapshot;

pub use customer::Customer;
pub use order::{Order, OrderItem, OrderLineRequest, OrderStatus, PlaceOrder, PlacedOrder};
pub use snapshot::{OrderSnapshot, SnapshotLine};
