use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// A dotted permission name such as `"orders.place"`.
///
/// `"*"` grants every permission. A name ending in `".*"` grants every
/// permission in that area, so `"orders.*"` covers placing and reading.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));
    /// Place an order for oneself.
    pub const PLACE_ORDER: Permission = Permission(Cow::Borrowed("orders.place"));
    /// Read any order summary.
    pub const READ_ORDERS: Permission = Permission(Cow::Borrowed("orders.read"));
    /// Upload products, singly or in bulk.
    pub const IMPORT_PRODUCTS: Permission = Permission(Cow::Borrowed("catalog.import"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Does holding `self` allow an operation that requires `required`?
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self == required {
            return true;
        }
        match self.as_str().strip_suffix(".*") {
            Some(area) => required
                .as_str()
                .strip_prefix(area)
                .is_some_and(|rest| rest.starts_with('.')),
            None => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
