//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure a lifecycle, identity or audit operation can surface to the
/// boundary layer. Messages are caller-visible: they name the offending status
/// or the required role, and nothing else.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced request or identity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The authorization policy denied the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The target's current status does not permit the action.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The payload failed validation (e.g. rejection reason too short).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transient storage fault (timeout, contention). Safe to retry with backoff.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Attempted mutation of an audit record. Always a programming error.
    #[error("audit records are immutable: {0}")]
    ImmutableRecord(String),
}

/// Stable, serializable discriminant of a [`DomainError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidTransition,
    ValidationError,
    StorageUnavailable,
    ImmutableRecordError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::InvalidTransition => "InvalidTransition",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::StorageUnavailable => "StorageUnavailable",
            ErrorKind::ImmutableRecordError => "ImmutableRecordError",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    pub fn immutable_record(msg: impl Into<String>) -> Self {
        Self::ImmutableRecord(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            DomainError::Validation(_) => ErrorKind::ValidationError,
            DomainError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            DomainError::ImmutableRecord(_) => ErrorKind::ImmutableRecordError,
        }
    }

    /// Only transient storage faults may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::StorageUnavailable(_))
    }

    /// The bare message, without the kind prefix added by `Display`.
    pub fn message(&self) -> &str {
        match self {
            DomainError::NotFound(m)
            | DomainError::Forbidden(m)
            | DomainError::InvalidTransition(m)
            | DomainError::Validation(m)
            | DomainError::StorageUnavailable(m)
            | DomainError::ImmutableRecord(m) => m,
        }
    }
}
