//! Explicit per-step execution context.
//!
//! A [`StepContext`] is the step-local service lookup: during one step it
//! hands out the single [`BatchCoordinator`] for each data source of its
//! sequence group. It is created fresh when a step opens and consumed when
//! the step is flushed.

use std::collections::HashMap;

use stepbatch_domain::{BatchExecutor, DataSource, SequenceGroup};

use super::coordinator::{BatchCoordinator, CacheFor, FlushSummary};

/// Monotonic step identifier.
pub type StepId = u64;

/// Coordinators of one sequence group for one step.
pub struct StepContext<B: BatchExecutor> {
    step: StepId,
    sequence_group: SequenceGroup,
    coordinators: HashMap<DataSource, BatchCoordinator<B>>,
    /// Data sources in the order their first request arrived.
    order: Vec<DataSource>,
}

impl<B: BatchExecutor> StepContext<B> {
    pub fn new(step: StepId, sequence_group: SequenceGroup) -> Self {
        Self {
            step,
            sequence_group,
            coordinators: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn step(&self) -> StepId {
        self.step
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }

    /// Returns the coordinator for `data_source` in this step, creating it
    /// on first use. Every call within the step returns the same instance.
    pub fn coordinator(&mut self, data_source: &DataSource) -> &mut BatchCoordinator<B> {
        if !self.coordinators.contains_key(data_source) {
            self.order.push(data_source.clone());
        }
        let sequence_group = &self.sequence_group;
        self.coordinators
            .entry(data_source.clone())
            .or_insert_with(|| BatchCoordinator::new(data_source.clone(), sequence_group.clone()))
    }

    /// Flushes every coordinator of the step, one after another.
    pub async fn flush(mut self, executor: &B, cache: &CacheFor<B>) -> Vec<FlushSummary> {
        let mut summaries = Vec::with_capacity(self.order.len());
        for data_source in std::mem::take(&mut self.order) {
            if let Some(coordinator) = self.coordinators.remove(&data_source) {
                summaries.push(coordinator.flush(executor, cache).await);
            }
        }
        summaries
    }
}

/// Aggregated outcome of one scheduler step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// The step that was closed.
    pub step: StepId,
    /// Submissions received during the step.
    pub submitted: usize,
    /// Submissions answered by the cache or merged into another request.
    pub deduplicated: usize,
    /// Executor invocations.
    pub batches: usize,
    /// Distinct queries handed to executors.
    pub queries: usize,
    /// Batches failed as a whole.
    pub failed_batches: usize,
    /// Requests resolved with an error.
    pub failed_requests: usize,
    /// Data sources invalidated by mutations.
    pub invalidations: usize,
}

impl StepReport {
    pub fn new(step: StepId) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, summary: &FlushSummary) {
        self.submitted += summary.submitted;
        self.deduplicated += summary.submitted - summary.executed;
        self.queries += summary.executed;
        self.failed_requests += summary.failed;
        if summary.batch_invoked {
            self.batches += 1;
        }
        if summary.batch_failed {
            self.failed_batches += 1;
        }
        if summary.invalidated {
            self.invalidations += 1;
        }
    }
}
