//! Who may import products, place orders and read them back.
//!
//! Callers arrive already authenticated as a [`Principal`]. Roles expand into
//! [`Permission`]s, and [`authorize`] checks a principal against one of them.
//! Order placement additionally requires the principal to act for the
//! customer the order is placed for.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize, authorize_order_placement, effective_permissions};
pub use permissions::Permission;
pub use principal::{Principal, PrincipalId};
pub use roles::{Role, permissions_for_role};
