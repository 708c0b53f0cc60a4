//! Shared primitives for the storefront crates: typed ids, prices and the
//! domain error every validation path returns.
//!
//! Nothing here touches storage, the clock or the network.

pub mod entity;
pub mod error;
pub mod id;
pub mod price;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CategoryId, CustomerId, OrderId, OrderItemId, ProductId};
pub use price::Price;
