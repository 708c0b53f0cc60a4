use std::collections::BTreeSet;

use thiserror::Error;

use storefront_core::CustomerId;

use crate::{Permission, Principal, permissions_for_role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: principal {principal} may not act as customer {customer}")]
    NotOwner { principal: String, customer: String },
}

/// Permissions granted explicitly plus those implied by the principal's roles.
pub fn effective_permissions(principal: &Principal) -> BTreeSet<Permission> {
    principal
        .roles
        .iter()
        .flat_map(permissions_for_role)
        .chain(principal.permissions.iter().cloned())
        .collect()
}

/// Authorize a principal for a single permission.
///
/// - No IO
/// - No panics
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if effective_permissions(principal)
        .iter()
        .any(|held| held.grants(required))
    {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// May `principal` place an order as `customer`?
///
/// Requires `orders.place`, and the customer must be the principal's own
/// record unless the principal holds the wildcard.
pub fn authorize_order_placement(
    principal: &Principal,
    customer: CustomerId,
) -> Result<(), AuthzError> {
    authorize(principal, &Permission::PLACE_ORDER)?;

    if principal.principal_id.customer_id() == customer {
        return Ok(());
    }
    if effective_permissions(principal).contains(&Permission::WILDCARD) {
        return Ok(());
    }
    Err(AuthzError::NotOwner {
        principal: principal.principal_id.to_string(),
        customer: customer.to_string(),
    })
}
