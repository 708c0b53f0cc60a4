use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storefront_core::CustomerId;

use crate::{Permission, Role};

/// Identity of an authenticated principal (shopper, staff member, service).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The customer record owned by this principal.
    pub fn customer_id(&self) -> CustomerId {
        CustomerId::from_uuid(self.0)
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for PrincipalId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<CustomerId> for PrincipalId {
    fn from(value: CustomerId) -> Self {
        Self(*value.as_uuid())
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A fully resolved, already-authenticated caller.
///
/// Construction is left to the transport layer: it derives roles from a
/// session or token and hands the result to the services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(principal_id: PrincipalId) -> Self {
        Self {
            principal_id,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// A shopper acting for their own customer record.
    pub fn customer(customer: CustomerId) -> Self {
        Self::new(customer.into()).with_role(Role::CUSTOMER)
    }

    /// A back-office user allowed to upload products.
    pub fn staff() -> Self {
        Self::new(PrincipalId::new()).with_role(Role::STAFF)
    }
}
