//! Batch execution plug-in contract.
//!
//! A batch kind supplies one [`BatchExecutor`]: a black box that takes the
//! distinct queries collected during one step and returns an outcome per
//! identity. It is the only place where real external I/O happens.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;

use crate::error::BatchResult;

/// One distinct query handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuery<K, Q> {
    /// Identity the outcome must be reported under.
    pub identity: K,
    /// Payload produced by the requester.
    pub query: Q,
}

impl<K, Q> BatchQuery<K, Q> {
    pub fn new(identity: K, query: Q) -> Self {
        Self { identity, query }
    }
}

/// Per-identity outcomes of one batch call.
///
/// Identities missing from the map are resolved with
/// [`BatchError::MissingResult`](crate::error::BatchError::MissingResult).
pub type BatchOutcome<K, V> = HashMap<K, BatchResult<V>>;

/// Executes all queries collected for one (data source, sequence group)
/// pair during one step.
///
/// Returning `Err` fails every request in the batch with that error.
/// Returning `Ok` with per-identity errors fails only those identities.
#[async_trait]
pub trait BatchExecutor: Send + Sync + 'static {
    /// Value identifying a logical request within a data source.
    type Identity: Hash + Eq + Clone + Debug + Send + Sync + 'static;
    /// Payload describing the work for one identity.
    type Query: Send + 'static;
    /// Successful result of one identity.
    type Value: Clone + Send + Sync + 'static;

    /// Runs one batch. Called at most once per coordinator per step.
    async fn execute(
        &self,
        queries: Vec<BatchQuery<Self::Identity, Self::Query>>,
    ) -> BatchResult<BatchOutcome<Self::Identity, Self::Value>>;
}
