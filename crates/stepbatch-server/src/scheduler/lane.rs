//! Per-sequence-group execution lanes.

use stepbatch_domain::{BatchExecutor, RequestDescriptor, ResultHandle, SchedulerResult, SequenceGroup};
use tokio::sync::Mutex;

use super::coordinator::CacheFor;
use super::step::{StepContext, StepId};

struct LaneState<B: BatchExecutor> {
    context: StepContext<B>,
    prepared: u64,
}

/// FIFO preparation lane for one sequence group.
///
/// Requests are prepared while holding the lane's mutex. Tokio's mutex
/// grants the lock in the order it was requested, so preparation follows
/// submission order and never overlaps within a lane. Lanes of different
/// groups share nothing and proceed in parallel.
pub struct SequenceLane<B: BatchExecutor> {
    group: SequenceGroup,
    state: Mutex<LaneState<B>>,
}

impl<B: BatchExecutor> SequenceLane<B> {
    pub fn new(group: SequenceGroup, step: StepId) -> Self {
        let context = StepContext::new(step, group.clone());
        Self {
            group,
            state: Mutex::new(LaneState {
                context,
                prepared: 0,
            }),
        }
    }

    pub fn group(&self) -> &SequenceGroup {
        &self.group
    }

    /// Total number of requests prepared on this lane.
    pub async fn prepared(&self) -> u64 {
        self.state.lock().await.prepared
    }

    /// Hands a request to the current step's coordinator for its data source.
    pub async fn prepare<F>(
        &self,
        cache: &CacheFor<B>,
        descriptor: RequestDescriptor<B::Identity>,
        make_query: F,
    ) -> SchedulerResult<ResultHandle<B::Value>>
    where
        F: FnOnce() -> B::Query,
    {
        let mut state = self.state.lock().await;
        state.prepared += 1;
        let data_source = descriptor.data_source().clone();
        state
            .context
            .coordinator(&data_source)
            .prepare(cache, descriptor, make_query)
    }

    /// Closes the lane's current step and opens `next`.
    ///
    /// Returns the closed context, or `None` when nothing was submitted.
    pub async fn close_step(&self, next: StepId) -> Option<StepContext<B>> {
        let mut state = self.state.lock().await;
        let fresh = StepContext::new(next, self.group.clone());
        let closed = std::mem::replace(&mut state.context, fresh);
        (!closed.is_empty()).then_some(closed)
    }
}
