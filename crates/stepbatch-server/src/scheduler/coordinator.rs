//! Step-local batch coordinator.

use std::collections::HashMap;

use stepbatch_domain::{
    BatchError, BatchExecutor, BatchQuery, DataSource, RequestDescriptor, ResultCache,
    ResultHandle, Resolver, SchedulerResult, SequenceGroup,
};
use tracing::{debug, instrument, warn};

/// Cache type used by coordinators of batch kind `B`.
pub type CacheFor<B> =
    ResultCache<<B as BatchExecutor>::Identity, <B as BatchExecutor>::Value>;

/// One distinct request waiting for the step's batch.
struct PendingRequest<B: BatchExecutor> {
    identity: B::Identity,
    query: B::Query,
    resolver: Resolver<B::Value>,
    handle: ResultHandle<B::Value>,
    /// Every merged submission was an idempotent read.
    cacheable: bool,
    /// The pending handle is stored in the cache and must be completed or
    /// evicted by the flush.
    admitted: bool,
    /// At least one merged submission was a mutation.
    mutation: bool,
    /// Data-source version captured when the request was enqueued.
    version: u64,
}

/// Outcome counters of one coordinator flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Submissions received during the step.
    pub submitted: usize,
    /// Distinct queries handed to the executor.
    pub executed: usize,
    /// Whether the executor was invoked.
    pub batch_invoked: bool,
    /// Whether the executor failed the whole batch.
    pub batch_failed: bool,
    /// Identities that resolved with an error.
    pub failed: usize,
    /// Whether a successful mutation invalidated the data source.
    pub invalidated: bool,
}

/// Collects the requests of one (data source, sequence group) pair during
/// one step and turns them into a single executor call.
///
/// The coordinator holds no locks. Its owning
/// [`SequenceLane`](super::lane::SequenceLane) guarantees only one
/// preparation touches it at a time.
pub struct BatchCoordinator<B: BatchExecutor> {
    data_source: DataSource,
    sequence_group: SequenceGroup,
    pending: Vec<PendingRequest<B>>,
    by_identity: HashMap<B::Identity, usize>,
    submitted: usize,
}

impl<B: BatchExecutor> BatchCoordinator<B> {
    pub fn new(data_source: DataSource, sequence_group: SequenceGroup) -> Self {
        Self {
            data_source,
            sequence_group,
            pending: Vec::new(),
            by_identity: HashMap::new(),
            submitted: 0,
        }
    }

    pub fn data_source(&self) -> &DataSource {
        &self.data_source
    }

    /// Number of distinct requests waiting for the flush.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of submissions received, including merged and cached ones.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Registers a request for this step and returns its handle.
    ///
    /// Idempotent reads are answered from the cache when an entry (pending
    /// or completed) exists; `make_query` is never called for them.
    /// Identities already pending in this step share the existing handle.
    pub fn prepare<F>(
        &mut self,
        cache: &CacheFor<B>,
        descriptor: RequestDescriptor<B::Identity>,
        make_query: F,
    ) -> SchedulerResult<ResultHandle<B::Value>>
    where
        F: FnOnce() -> B::Query,
    {
        self.submitted += 1;

        if descriptor.is_cacheable() {
            if let Some(handle) = cache.lookup(&self.data_source, descriptor.identity()) {
                metrics::counter!("stepbatch_deduplicated_total").increment(1);
                return Ok(handle);
            }
        }

        if let Some(&index) = self.by_identity.get(descriptor.identity()) {
            let pending = &mut self.pending[index];
            pending.cacheable &= descriptor.is_cacheable();
            pending.mutation |= descriptor.is_mutation();
            // The shared result now answers a write or a non-idempotent
            // call, so later steps must not reuse it.
            if pending.admitted && !pending.cacheable {
                cache.evict(&self.data_source, &pending.identity, pending.version);
                pending.admitted = false;
            }
            metrics::counter!("stepbatch_deduplicated_total").increment(1);
            return Ok(pending.handle.clone());
        }

        let version = cache.version(&self.data_source);
        let (resolver, handle) = ResultHandle::pending();
        let admitted =
            descriptor.is_cacheable() && cache.insert(&descriptor, handle.clone(), version)?;

        let identity = descriptor.identity().clone();
        self.by_identity.insert(identity.clone(), self.pending.len());
        self.pending.push(PendingRequest {
            identity,
            query: make_query(),
            resolver,
            handle: handle.clone(),
            cacheable: descriptor.is_cacheable(),
            admitted,
            mutation: descriptor.is_mutation(),
            version,
        });

        Ok(handle)
    }

    /// Executes the step's batch and fans the outcome back to every waiter.
    ///
    /// Successful mutations invalidate the data source before any waiter is
    /// woken. Cacheable results are then written back under the version
    /// captured at enqueue time, so results computed alongside a mutation
    /// are dropped by the cache as stale.
    #[instrument(
        name = "batch_flush",
        skip_all,
        fields(
            data_source = %self.data_source,
            sequence_group = %self.sequence_group,
            batch_size = self.pending.len(),
        )
    )]
    pub async fn flush(self, executor: &B, cache: &CacheFor<B>) -> FlushSummary {
        let mut summary = FlushSummary {
            submitted: self.submitted,
            ..FlushSummary::default()
        };
        if self.pending.is_empty() {
            return summary;
        }

        let data_source = self.data_source;
        let mut queries = Vec::with_capacity(self.pending.len());
        let mut waiters: Vec<Waiter<B>> = Vec::with_capacity(self.pending.len());
        for pending in self.pending {
            queries.push(BatchQuery::new(pending.identity.clone(), pending.query));
            waiters.push(Waiter {
                identity: pending.identity,
                resolver: pending.resolver,
                admitted: pending.admitted,
                mutation: pending.mutation,
                version: pending.version,
            });
        }

        summary.executed = queries.len();
        summary.batch_invoked = true;
        metrics::counter!("stepbatch_batches_executed_total").increment(1);
        metrics::counter!("stepbatch_queries_executed_total").increment(queries.len() as u64);
        debug!(queries = queries.len(), "executing batch");

        let mut outcomes = match executor.execute(queries).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                warn!(error = %err, waiters = waiters.len(), "batch failed");
                metrics::counter!("stepbatch_batch_failures_total").increment(1);
                summary.batch_failed = true;
                summary.failed = waiters.len();
                for waiter in waiters {
                    if waiter.admitted {
                        cache.evict(&data_source, &waiter.identity, waiter.version);
                    }
                    waiter.resolver.resolve(Err(err.clone()));
                }
                return summary;
            }
        };

        let resolved: Vec<_> = waiters
            .into_iter()
            .map(|waiter| {
                let outcome = outcomes.remove(&waiter.identity).unwrap_or_else(|| {
                    Err(BatchError::MissingResult {
                        identity: format!("{:?}", waiter.identity),
                    })
                });
                (waiter, outcome)
            })
            .collect();

        if resolved
            .iter()
            .any(|(waiter, outcome)| waiter.mutation && outcome.is_ok())
        {
            cache.invalidate(&data_source);
            summary.invalidated = true;
        }

        for (waiter, outcome) in resolved {
            match &outcome {
                Ok(value) if waiter.admitted => {
                    cache.complete(&data_source, &waiter.identity, value.clone(), waiter.version);
                }
                Ok(_) => {}
                Err(err) => {
                    summary.failed += 1;
                    debug!(identity = ?waiter.identity, error = %err, "request failed");
                    if waiter.admitted {
                        cache.evict(&data_source, &waiter.identity, waiter.version);
                    }
                }
            }
            waiter.resolver.resolve(outcome);
        }

        summary
    }
}

/// A pending request after its query was handed to the executor.
struct Waiter<B: BatchExecutor> {
    identity: B::Identity,
    resolver: Resolver<B::Value>,
    admitted: bool,
    mutation: bool,
    version: u64,
}
