//! Service-level error taxonomy.

use thiserror::Error;

use storefront_auth::AuthzError;
use storefront_core::DomainError;

use crate::store::StoreError;

/// Error returned by the catalog, import and order services.
///
/// Uniqueness conflicts on category creation are retried inside the services
/// and only reach this type once the retry budget is spent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Bad or missing input. Request- or row-scoped.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced category, product, order or customer does not exist.
    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Storage failed mid-operation; the unit of work was rolled back.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ServiceError::Infrastructure(_))
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound(ref what) => ServiceError::NotFound(what.clone()),
            DomainError::Unauthorized => ServiceError::Unauthorized(err.message()),
            other => ServiceError::Validation(other.message()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            other => ServiceError::Infrastructure(other.to_string()),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        ServiceError::Unauthorized(err.to_string())
    }
}
