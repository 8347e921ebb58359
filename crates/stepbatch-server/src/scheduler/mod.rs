//! Step scheduler with request deduplication, batching and caching.
//!
//! The scheduler turns many concurrent submissions into few executor calls:
//!
//! 1. **Cache deduplication**: idempotent reads already cached (completed or
//!    still in flight) reuse the existing handle
//! 2. **Intra-step merging**: identical identities within one step share one
//!    query and one handle
//! 3. **Sequence lanes**: requests sharing a sequence group are prepared in
//!    submission order, one at a time
//! 4. **Scoped invalidation**: successful mutations clear their data source
//!
//! A step closes when [`Scheduler::flush_step`] runs, either called by the
//! owner or by the loop started with [`Scheduler::spawn_step_loop`].
//! Steps never overlap: the next step's batches fire only after every batch
//! of the previous step resolved.

mod coordinator;
mod lane;
mod step;

pub use coordinator::{BatchCoordinator, CacheFor, FlushSummary};
pub use lane::SequenceLane;
pub use step::{StepContext, StepId, StepReport};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use stepbatch_domain::{
    BatchExecutor, RequestDescriptor, ResultHandle, SchedulerResult, SequenceGroup,
};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument};

/// Deduplicating, batching scheduler for one batch kind.
pub struct Scheduler<B: BatchExecutor> {
    executor: Arc<B>,
    cache: Arc<CacheFor<B>>,
    lanes: DashMap<SequenceGroup, Arc<SequenceLane<B>>>,
    step: AtomicU64,
    /// Serializes step boundaries.
    flush_gate: Mutex<()>,
}

impl<B: BatchExecutor> std::fmt::Debug for Scheduler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("step", &self.current_step())
            .field("lanes", &self.lanes.len())
            .field("cache", &self.cache)
            .finish()
    }
}

impl<B: BatchExecutor> Scheduler<B> {
    /// Creates a scheduler around an executor and an explicit cache service.
    ///
    /// Schedulers sharing one cache share its entries and invalidations.
    pub fn new(executor: Arc<B>, cache: Arc<CacheFor<B>>) -> Self {
        Self {
            executor,
            cache,
            lanes: DashMap::new(),
            step: AtomicU64::new(0),
            flush_gate: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<CacheFor<B>> {
        &self.cache
    }

    pub fn executor(&self) -> &Arc<B> {
        &self.executor
    }

    /// The step currently collecting requests.
    pub fn current_step(&self) -> StepId {
        self.step.load(Ordering::Acquire)
    }

    /// Submits a request and returns a handle to its eventual result.
    ///
    /// `make_query` runs only when the request actually needs a new query;
    /// cached and merged requests never call it. The returned handle
    /// resolves once the step containing the request is flushed.
    ///
    /// # Errors
    ///
    /// Fails only on cache misconfiguration; batch errors are delivered
    /// through the handle.
    pub async fn submit<F>(
        &self,
        descriptor: RequestDescriptor<B::Identity>,
        make_query: F,
    ) -> SchedulerResult<ResultHandle<B::Value>>
    where
        F: FnOnce() -> B::Query + Send,
    {
        let lane = self.lane(descriptor.sequence_group());
        lane.prepare(&self.cache, descriptor, make_query).await
    }

    /// Submits a request and waits for its result.
    pub async fn resolve<F>(
        &self,
        descriptor: RequestDescriptor<B::Identity>,
        make_query: F,
    ) -> SchedulerResult<B::Value>
    where
        F: FnOnce() -> B::Query + Send,
    {
        let handle = self.submit(descriptor, make_query).await?;
        Ok(handle.await?)
    }

    /// Closes the current step and fires its batches.
    ///
    /// Lanes flush concurrently; within a lane, coordinators flush one
    /// after another. Returns once every handle of the step is resolved.
    #[instrument(skip(self), fields(step = tracing::field::Empty))]
    pub async fn flush_step(&self) -> StepReport {
        let _gate = self.flush_gate.lock().await;
        let step = self.step.fetch_add(1, Ordering::AcqRel);
        tracing::Span::current().record("step", step);

        let lanes: Vec<Arc<SequenceLane<B>>> = self
            .lanes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut contexts = Vec::with_capacity(lanes.len());
        for lane in &lanes {
            if let Some(context) = lane.close_step(step + 1).await {
                contexts.push(context);
            }
        }

        let mut report = StepReport::new(step);
        if contexts.is_empty() {
            return report;
        }

        let executor = self.executor.as_ref();
        let cache = self.cache.as_ref();
        let flushed = join_all(
            contexts
                .into_iter()
                .map(|context| context.flush(executor, cache)),
        )
        .await;

        for summary in flushed.iter().flatten() {
            report.record(summary);
        }
        debug!(
            batches = report.batches,
            queries = report.queries,
            deduplicated = report.deduplicated,
            failed_batches = report.failed_batches,
            "step flushed"
        );
        report
    }

    /// Returns the step-spanning lane of a sequence group, creating it on
    /// first use.
    pub fn lane(&self, group: &SequenceGroup) -> Arc<SequenceLane<B>> {
        if let Some(lane) = self.lanes.get(group) {
            return Arc::clone(lane.value());
        }
        let step = self.current_step();
        Arc::clone(
            self.lanes
                .entry(group.clone())
                .or_insert_with(|| Arc::new(SequenceLane::new(group.clone(), step)))
                .value(),
        )
    }

    /// Starts a background task flushing a step every `period`.
    ///
    /// The loop runs until the returned [`StepLoop`] is shut down, which
    /// flushes one final step so no submitted request is left unresolved.
    pub fn spawn_step_loop(self: &Arc<Self>, period: Duration) -> StepLoop {
        let scheduler = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_ms = period.as_millis() as u64, "step loop started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        scheduler.flush_step().await;
                        break;
                    }
                    _ = ticker.tick() => {
                        scheduler.flush_step().await;
                    }
                }
            }

            info!("step loop stopped");
        });

        StepLoop {
            shutdown: Some(shutdown_tx),
            handle,
        }
    }
}

/// Handle to a running step loop.
pub struct StepLoop {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl StepLoop {
    /// Stops the loop after one final flush and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.handle).await {
            tracing::error!(error = %err, "step loop task failed");
        }
    }
}

impl Drop for StepLoop {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.handle.abort();
        }
    }
}
