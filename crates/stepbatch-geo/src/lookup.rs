//! Address lookups submitted through the step scheduler.

use std::sync::Arc;

use futures::future::join_all;
use stepbatch_domain::{RequestDescriptor, ResultCache, ResultHandle, SchedulerResult};
use stepbatch_server::Scheduler;
use tracing::debug;

use crate::batch::GeoBatch;
use crate::config::GeoConfig;
use crate::error::GeoError;
use crate::info::{GeoInfo, GeoQuery};
use crate::provider::{GeoProvider, IpApiProvider};

/// Data source and sequence group shared by every address lookup.
pub const GEO_BATCH: &str = "GeoBatch";

/// Builds the descriptor of a lookup for `ip`.
///
/// Lookups of the same address are interchangeable and change nothing, so
/// they deduplicate and cache. They share one sequence group, so the
/// batch object sees its queries one at a time.
pub fn lookup_descriptor(ip: &str) -> RequestDescriptor<String> {
    RequestDescriptor::read(ip.to_string(), GEO_BATCH, GEO_BATCH)
}

/// Front door for address lookups.
#[derive(Debug)]
pub struct GeoLookup<P: GeoProvider> {
    scheduler: Arc<Scheduler<GeoBatch<P>>>,
}

impl<P: GeoProvider> Clone for GeoLookup<P> {
    fn clone(&self) -> Self {
        Self {
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

impl GeoLookup<IpApiProvider> {
    /// Builds the ip-api backed lookup described by `config`.
    pub fn from_config(config: &GeoConfig) -> Result<Self, GeoError> {
        let provider = IpApiProvider::new(&config.geo.endpoint, config.geo.timeout())?;
        let batch = GeoBatch::new(Arc::new(provider), config.geo.page_size);
        let cache = ResultCache::new(config.scheduler.cache.to_cache_config());
        Ok(Self::new(Arc::new(Scheduler::new(
            Arc::new(batch),
            Arc::new(cache),
        ))))
    }
}

impl<P: GeoProvider> GeoLookup<P> {
    pub fn new(scheduler: Arc<Scheduler<GeoBatch<P>>>) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler<GeoBatch<P>>> {
        &self.scheduler
    }

    /// Queues a lookup in the current step.
    ///
    /// The handle resolves once the step is flushed, by
    /// [`Scheduler::flush_step`] or by a running step loop.
    pub async fn submit(&self, ip: &str) -> SchedulerResult<ResultHandle<GeoInfo>> {
        let query = GeoQuery::new(ip);
        self.scheduler
            .submit(lookup_descriptor(ip), move || query)
            .await
    }

    /// Looks up one address. Requires a running step loop.
    pub async fn lookup(&self, ip: &str) -> SchedulerResult<GeoInfo> {
        let handle = self.submit(ip).await?;
        Ok(handle.await?)
    }

    /// Looks up every address in one step and returns the results in input
    /// order. Repeated addresses cost one query.
    pub async fn lookup_all<I, S>(&self, ips: I) -> Vec<(String, SchedulerResult<GeoInfo>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pending = Vec::new();
        for ip in ips {
            let ip = ip.as_ref().to_string();
            let handle = self.submit(&ip).await;
            pending.push((ip, handle));
        }

        let report = self.scheduler.flush_step().await;
        debug!(
            submitted = report.submitted,
            queries = report.queries,
            "lookup step flushed"
        );

        join_all(pending.into_iter().map(|(ip, handle)| async move {
            let result = match handle {
                Ok(handle) => handle.await.map_err(Into::into),
                Err(err) => Err(err),
            };
            (ip, result)
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use stepbatch_domain::{BatchError, ResultCacheConfig, SchedulerError};

    /// Locates every address in "Atlantis", counting provider calls.
    #[derive(Default)]
    struct AtlantisProvider {
        calls: AtomicUsize,
        queries: AtomicUsize,
    }

    #[async_trait]
    impl GeoProvider for AtlantisProvider {
        async fn lookup_page(&self, page: &[GeoQuery]) -> Result<Vec<GeoInfo>, GeoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.fetch_add(page.len(), Ordering::SeqCst);
            Ok(page
                .iter()
                .map(|q| {
                    if q.query == "0.0.0.0" {
                        GeoInfo {
                            status: "fail".to_string(),
                            message: Some("invalid query".to_string()),
                            query: q.query.clone(),
                            ..Default::default()
                        }
                    } else {
                        GeoInfo {
                            status: "success".to_string(),
                            country: Some("Atlantis".to_string()),
                            query: q.query.clone(),
                            ..Default::default()
                        }
                    }
                })
                .collect())
        }
    }

    fn lookup_with(provider: Arc<AtlantisProvider>) -> GeoLookup<AtlantisProvider> {
        let batch = GeoBatch::new(provider, 100);
        let cache = ResultCache::new(ResultCacheConfig::default());
        GeoLookup::new(Arc::new(Scheduler::new(Arc::new(batch), Arc::new(cache))))
    }

    #[test]
    fn test_descriptor_is_a_cacheable_read() {
        let descriptor = lookup_descriptor("1.1.1.1");

        assert_eq!(descriptor.identity(), "1.1.1.1");
        assert_eq!(descriptor.data_source().as_str(), GEO_BATCH);
        assert_eq!(descriptor.sequence_group().as_str(), GEO_BATCH);
        assert!(descriptor.is_idempotent());
        assert!(!descriptor.is_mutation());
        assert!(descriptor.is_cacheable());
    }

    #[tokio::test]
    async fn test_lookup_all_deduplicates_within_step() {
        // Arrange
        let provider = Arc::new(AtlantisProvider::default());
        let lookup = lookup_with(Arc::clone(&provider));

        // Act
        let results = lookup
            .lookup_all(["1.1.1.1", "8.8.8.8", "1.1.1.1"])
            .await;

        // Assert
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.queries.load(Ordering::SeqCst), 2);
        let ips: Vec<&str> = results.iter().map(|(ip, _)| ip.as_str()).collect();
        assert_eq!(ips, vec!["1.1.1.1", "8.8.8.8", "1.1.1.1"]);
        let first = results[0].1.as_ref().unwrap();
        let third = results[2].1.as_ref().unwrap();
        assert_eq!(first, third);
        assert_eq!(first.country.as_deref(), Some("Atlantis"));
    }

    #[tokio::test]
    async fn test_later_lookup_is_served_from_cache() {
        let provider = Arc::new(AtlantisProvider::default());
        let lookup = lookup_with(Arc::clone(&provider));

        lookup.lookup_all(["9.9.9.9"]).await;
        let results = lookup.lookup_all(["9.9.9.9"]).await;

        assert!(results[0].1.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_address_is_reported_and_retried() {
        // Arrange
        let provider = Arc::new(AtlantisProvider::default());
        let lookup = lookup_with(Arc::clone(&provider));

        // Act
        let first = lookup.lookup_all(["0.0.0.0"]).await;
        let second = lookup.lookup_all(["0.0.0.0"]).await;

        // Assert
        let expected = SchedulerError::Batch(BatchError::provider(
            "lookup of 0.0.0.0 failed: invalid query",
        ));
        assert_eq!(first[0].1, Err(expected.clone()));
        assert_eq!(second[0].1, Err(expected));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lookup_resolves_under_step_loop() {
        let provider = Arc::new(AtlantisProvider::default());
        let lookup = lookup_with(provider);
        let step_loop = lookup
            .scheduler()
            .spawn_step_loop(Duration::from_millis(5));

        let info = tokio::time::timeout(Duration::from_secs(5), lookup.lookup("4.4.4.4"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(info.query, "4.4.4.4");
        step_loop.shutdown().await;
    }
}
