//! Error types for batch execution and scheduling.

use thiserror::Error;

/// Errors produced by a batch-execution function.
///
/// A single batch failure is delivered to every waiter tied to that batch,
/// so the type is cheap to clone and carries owned messages only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The transport carrying the batch failed (connection, timeout, status).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The provider answered but rejected a query or the whole batch.
    #[error("provider error: {message}")]
    Provider { message: String },

    /// The executor returned no outcome for an identity it was given.
    #[error("batch returned no result for identity {identity}")]
    MissingResult { identity: String },

    /// The batch owning this request was dropped before resolving it.
    #[error("request was abandoned before its batch resolved")]
    Abandoned,
}

impl BatchError {
    /// Creates a transport error from any displayable cause.
    pub fn transport(message: impl Into<String>) -> Self {
        BatchError::Transport {
            message: message.into(),
        }
    }

    /// Creates a provider error from any displayable cause.
    pub fn provider(message: impl Into<String>) -> Self {
        BatchError::Provider {
            message: message.into(),
        }
    }
}

/// Errors raised by the scheduler and the result cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A collaborator tried to cache the result of a non-idempotent request.
    #[error("cannot cache result of non-idempotent request in data source '{data_source}'")]
    NonIdempotentInsert { data_source: String },

    /// A collaborator tried to cache the result of a mutation.
    #[error("cannot cache result of mutation in data source '{data_source}'")]
    MutationInsert { data_source: String },

    /// The batch owning the request failed.
    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Result type for batch execution.
pub type BatchResult<T> = Result<T, BatchError>;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
