//! Error types for the employee domain.

use thiserror::Error;

/// Errors that can occur while handling commands against an actor's journal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The command carried input that cannot be accepted.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    /// Onboarding was requested for an employee that already exists.
    #[error("employee '{id}' is already onboarded")]
    AlreadyOnboarded { id: String },
    /// The employee was offboarded; the entity is terminal.
    #[error("employee '{id}' has been offboarded")]
    AlreadyOffboarded { id: String },
    /// A stored employee was started again with a different identity.
    #[error("employee '{id}' already exists with a different {field}")]
    IdentityMismatch { id: String, field: &'static str },
    /// Command executed on an uninitialized aggregate.
    #[error("{entity} not initialized")]
    NotInitialized { entity: &'static str },
    /// Storage/persistence failure.
    #[error("storage failure: {message}")]
    StorageFailure { message: String },
    /// Optimistic lock failure (concurrent modification detected).
    #[error("concurrency conflict: {message}")]
    ConcurrencyConflict { message: String },
}

impl DomainError {
    /// True when the journal itself failed, as opposed to a rejected command.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            DomainError::StorageFailure { .. } | DomainError::ConcurrencyConflict { .. }
        )
    }
}
