//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A category path resolved to zero segments.
    #[error("invalid category path: {0}")]
    InvalidPath(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. a uniqueness constraint was hit).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Message suitable for a per-row or per-request error report.
    ///
    /// Unlike `Display`, this drops the error-kind prefix so that reports read
    /// like `"price must be a decimal number"`.
    pub fn message(&self) -> String {
        match self {
            DomainError::Validation(m)
            | DomainError::InvalidPath(m)
            | DomainError::InvariantViolation(m)
            | DomainError::InvalidId(m)
            | DomainError::Conflict(m) => m.clone(),
            DomainError::NotFound(what) => format!("{what} not found"),
            DomainError::Unauthorized => "unauthorized".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_strips_kind_prefix() {
        let err = DomainError::validation("name is required");
        assert_eq!(err.to_string(), "validation failed: name is required");
        assert_eq!(err.message(), "name is required");
    }

    #[test]
    fn not_found_message_names_the_resource() {
        assert_eq!(DomainError::not_found("product").message(), "product not found");
    }
}
