//! Shared error types for the services crate.

use std::fmt;

use thiserror::Error;
use tracing::error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use training_core::model::{
    CompletionId, ContentValidationError, IdempotencyKey, SessionError, SessionId, UserId,
};

/// The thing an operation could not find or could not write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Account(UserId),
    Session(SessionId),
    Completion(CompletionId),
    IdempotencyKey(IdempotencyKey),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Account(id) => write!(f, "account for user {id}"),
            Resource::Session(id) => write!(f, "session {id}"),
            Resource::Completion(id) => write!(f, "completion {id}"),
            Resource::IdempotencyKey(key) => write!(f, "idempotency key {key}"),
        }
    }
}

/// Errors emitted by the progression services.
///
/// Ownership mismatches are reported as `NotFound` so callers cannot probe
/// other users' data.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(Resource),

    #[error(transparent)]
    Validation(#[from] ContentValidationError),

    #[error(transparent)]
    InvalidSession(SessionError),

    #[error("{0} was modified concurrently")]
    Conflict(Resource),

    #[error("user {0} is already registered")]
    AlreadyRegistered(UserId),

    /// Detail is logged where it happens; the message stays generic.
    #[error("storage unavailable")]
    Storage(#[source] StorageError),
}

impl ServiceError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            // A key bound to another session stays bound.
            ServiceError::Conflict(Resource::IdempotencyKey(_)) => false,
            ServiceError::Conflict(_) | ServiceError::Storage(StorageError::Connection(_)) => true,
            _ => false,
        }
    }

    /// Map a storage error raised while working on `resource`.
    pub(crate) fn storage(resource: Resource) -> impl FnOnce(StorageError) -> ServiceError {
        move |err| match err {
            StorageError::NotFound => ServiceError::NotFound(resource),
            StorageError::Conflict => ServiceError::Conflict(resource),
            other => {
                error!(%resource, error = %other, "storage operation failed");
                ServiceError::Storage(other)
            }
        }
    }
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Deleted(id) => ServiceError::NotFound(Resource::Session(id)),
            SessionError::InvalidPlan(inner) => ServiceError::Validation(inner),
            other => ServiceError::InvalidSession(other),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
