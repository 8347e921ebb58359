//! Result caching with data-source scoped invalidation.
//!
//! This module provides the cache that lets identical requests share one
//! in-flight or completed result. Entries are keyed by
//! `(data_source, identity)` and hold a [`ResultHandle`], so a cached entry
//! may still be pending when it is looked up.
//!
//! # Architecture
//!
//! Storage uses Moka's sync Cache, which provides:
//! - Lock-free concurrent reads
//! - Memory-bounded storage
//! - Optional TTL-based eviction
//!
//! A secondary index maps each data source to its version counter and the
//! keys stored under it. Invalidating a data source bumps the version and
//! removes exactly those keys, in O(K) for K keys of that data source.
//!
//! # Staleness
//!
//! Writers capture the data-source version before their batch runs and hand
//! it back on insert. Inserts carrying a version older than the current one
//! are silently dropped: a result computed before a mutation never lands in
//! the cache after that mutation's invalidation.
//!
//! # Example
//!
//! ```rust,ignore
//! use stepbatch_domain::cache::{ResultCache, ResultCacheConfig};
//! use stepbatch_domain::{DataSource, RequestDescriptor, ResultHandle};
//!
//! let cache = ResultCache::new(ResultCacheConfig::default());
//! let descriptor = RequestDescriptor::read("1.1.1.1".to_string(), "geo", "geo");
//!
//! let version = cache.version(descriptor.data_source());
//! cache.insert(&descriptor, ResultHandle::ready(Ok(7)), version)?;
//!
//! assert!(cache.lookup(descriptor.data_source(), descriptor.identity()).is_some());
//! ```

use std::collections::HashSet;
use std::hash::Hash;
use std::time::Duration;

use dashmap::DashMap;
use moka::sync::Cache;
use tracing::debug;

use crate::descriptor::{DataSource, RequestDescriptor};
use crate::error::{SchedulerError, SchedulerResult};
use crate::handle::ResultHandle;

/// Configuration for the result cache.
#[derive(Debug, Clone)]
pub struct ResultCacheConfig {
    /// Whether results are stored at all.
    ///
    /// A disabled cache still tracks versions, so in-flight writers observe
    /// invalidations the same way.
    pub enabled: bool,
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,
    /// Optional time-to-live for entries. `None` keeps entries until they
    /// are invalidated or evicted for capacity.
    pub ttl: Option<Duration>,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 10_000,
            ttl: None,
        }
    }
}

impl ResultCacheConfig {
    /// Enables or disables caching.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the maximum capacity.
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Sets the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Cache key: one identity inside one data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey<K> {
    pub data_source: DataSource,
    pub identity: K,
}

impl<K> CacheKey<K> {
    pub fn new(data_source: DataSource, identity: K) -> Self {
        Self {
            data_source,
            identity,
        }
    }
}

/// Version counter and key index of one data source.
#[derive(Debug)]
struct Scope<K> {
    version: u64,
    keys: HashSet<K>,
}

impl<K> Default for Scope<K> {
    fn default() -> Self {
        Self {
            version: 0,
            keys: HashSet::new(),
        }
    }
}

/// Concurrent result cache shared by every sequence lane.
///
/// # Thread Safety
///
/// Lookups and inserts for one data source take that data source's index
/// entry, so they are atomic with respect to its invalidation. Different
/// data sources never block each other beyond DashMap shard contention.
pub struct ResultCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// The underlying Moka cache storing result handles.
    entries: Cache<CacheKey<K>, ResultHandle<V>>,
    /// Secondary index: data source -> version and stored identities.
    scopes: DashMap<DataSource, Scope<K>>,
    config: ResultCacheConfig,
}

impl<K, V> std::fmt::Debug for ResultCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("config", &self.config)
            .field("entry_count", &self.entries.entry_count())
            .field("scope_count", &self.scopes.len())
            .finish()
    }
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new result cache with the given configuration.
    pub fn new(config: ResultCacheConfig) -> Self {
        let mut builder =
            Cache::<CacheKey<K>, ResultHandle<V>>::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            entries: builder.build(),
            scopes: DashMap::new(),
            config,
        }
    }

    /// Returns the configuration for this cache instance.
    pub fn config(&self) -> &ResultCacheConfig {
        &self.config
    }

    /// Returns whether results are stored.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Returns the current version of a data source.
    ///
    /// Writers capture this before starting work and pass it to
    /// [`insert`](Self::insert) and [`complete`](Self::complete).
    pub fn version(&self, data_source: &DataSource) -> u64 {
        self.scopes
            .get(data_source)
            .map(|scope| scope.version)
            .unwrap_or(0)
    }

    /// Retrieves the handle cached for `(data_source, identity)`.
    ///
    /// The handle may still be pending. Handles already known to have
    /// failed are treated as a miss, so errors are never replayed.
    ///
    /// # Metrics
    ///
    /// - `stepbatch_cache_hits_total` - Incremented on cache hit
    /// - `stepbatch_cache_misses_total` - Incremented on cache miss
    pub fn lookup(&self, data_source: &DataSource, identity: &K) -> Option<ResultHandle<V>> {
        if !self.config.enabled {
            return None;
        }

        // Holding the scope entry keeps invalidation of this data source out
        // while we read.
        let result = self.scopes.get(data_source).and_then(|_scope| {
            self.entries
                .get(&CacheKey::new(data_source.clone(), identity.clone()))
                .filter(|handle| !handle.is_failed())
        });

        if result.is_some() {
            metrics::counter!("stepbatch_cache_hits_total").increment(1);
        } else {
            metrics::counter!("stepbatch_cache_misses_total").increment(1);
        }
        result
    }

    /// Stores a handle for an idempotent, non-mutating request.
    ///
    /// Returns `Ok(false)` when the write was dropped because the cache is
    /// disabled or `version` is older than the data source's current version.
    ///
    /// # Errors
    ///
    /// Caching the result of a non-idempotent request or of a mutation is a
    /// programming error and fails with
    /// [`SchedulerError::NonIdempotentInsert`] or
    /// [`SchedulerError::MutationInsert`].
    pub fn insert(
        &self,
        descriptor: &RequestDescriptor<K>,
        handle: ResultHandle<V>,
        version: u64,
    ) -> SchedulerResult<bool> {
        let data_source = descriptor.data_source();
        if descriptor.is_mutation() {
            return Err(SchedulerError::MutationInsert {
                data_source: data_source.to_string(),
            });
        }
        if !descriptor.is_idempotent() {
            return Err(SchedulerError::NonIdempotentInsert {
                data_source: data_source.to_string(),
            });
        }

        Ok(self.store(data_source, descriptor.identity(), handle, version, false))
    }

    /// Replaces an admitted entry with its completed value.
    ///
    /// Only identities previously admitted through [`insert`](Self::insert)
    /// under the same version are updated; anything else is discarded.
    pub fn complete(&self, data_source: &DataSource, identity: &K, value: V, version: u64) -> bool {
        self.store(
            data_source,
            identity,
            ResultHandle::ready(Ok(value)),
            version,
            true,
        )
    }

    /// Drops the entry of a request whose batch failed, unless the data
    /// source moved on to a newer version in the meantime.
    pub fn evict(&self, data_source: &DataSource, identity: &K, version: u64) {
        if let Some(mut scope) = self.scopes.get_mut(data_source) {
            if scope.version == version && scope.keys.remove(identity) {
                self.entries
                    .invalidate(&CacheKey::new(data_source.clone(), identity.clone()));
            }
        }
    }

    /// Removes every entry of a data source and bumps its version.
    ///
    /// Returns the number of identities removed.
    pub fn invalidate(&self, data_source: &DataSource) -> usize {
        // entry() holds the shard write lock, so no insert or lookup for this
        // data source interleaves with the version bump.
        let mut scope = self.scopes.entry(data_source.clone()).or_default();
        scope.version += 1;
        let keys = std::mem::take(&mut scope.keys);
        for identity in &keys {
            self.entries
                .invalidate(&CacheKey::new(data_source.clone(), identity.clone()));
        }

        metrics::counter!("stepbatch_cache_invalidations_total").increment(1);
        debug!(
            data_source = %data_source,
            version = scope.version,
            removed = keys.len(),
            "invalidated data source"
        );
        keys.len()
    }

    /// Returns the number of identities indexed under a data source.
    pub fn indexed_len(&self, data_source: &DataSource) -> usize {
        self.scopes
            .get(data_source)
            .map(|scope| scope.keys.len())
            .unwrap_or(0)
    }

    /// Returns the approximate number of entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Runs pending maintenance tasks such as TTL evictions.
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }

    fn store(
        &self,
        data_source: &DataSource,
        identity: &K,
        handle: ResultHandle<V>,
        version: u64,
        admitted_only: bool,
    ) -> bool {
        if !self.config.enabled {
            return false;
        }

        let mut scope = self.scopes.entry(data_source.clone()).or_default();
        if scope.version != version {
            metrics::counter!("stepbatch_cache_stale_writes_total").increment(1);
            debug!(
                data_source = %data_source,
                current = scope.version,
                written = version,
                "discarded stale cache write"
            );
            return false;
        }
        if admitted_only && !scope.keys.contains(identity) {
            return false;
        }

        scope.keys.insert(identity.clone());
        self.entries
            .insert(CacheKey::new(data_source.clone(), identity.clone()), handle);

        // Moka drops entries on its own for capacity and TTL; forget those
        // identities once the index outgrows what the cache can hold.
        if scope.keys.len() as u64 > self.config.max_capacity.saturating_mul(2).max(16) {
            self.prune(data_source, &mut scope.keys);
        }
        true
    }

    fn prune(&self, data_source: &DataSource, keys: &mut HashSet<K>) {
        self.entries.run_pending_tasks();
        let before = keys.len();
        keys.retain(|identity| {
            self.entries
                .contains_key(&CacheKey::new(data_source.clone(), identity.clone()))
        });
        debug!(
            data_source = %data_source,
            removed = before - keys.len(),
            "pruned evicted identities from index"
        );
    }
}

/// Registers result cache metrics descriptions.
///
/// Call this function once during application startup to register metric
/// descriptions with the metrics recorder.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "stepbatch_cache_hits_total",
        "Total number of result cache hits"
    );
    metrics::describe_counter!(
        "stepbatch_cache_misses_total",
        "Total number of result cache misses"
    );
    metrics::describe_counter!(
        "stepbatch_cache_stale_writes_total",
        "Cache writes dropped because their data source was invalidated"
    );
    metrics::describe_counter!(
        "stepbatch_cache_invalidations_total",
        "Total number of data-source invalidations"
    );
}
