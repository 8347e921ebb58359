//! The geolocation batch kind.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use stepbatch_domain::{BatchError, BatchExecutor, BatchOutcome, BatchQuery, BatchResult};
use tracing::{instrument, warn};

use crate::info::{GeoInfo, GeoQuery};
use crate::provider::GeoProvider;

/// Largest page the ip-api batch endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 100;

/// Executes the lookups of one step as provider pages.
///
/// Distinct addresses are split into pages of at most `page_size` and the
/// pages are sent concurrently. A page that fails fails only its own
/// addresses.
#[derive(Debug)]
pub struct GeoBatch<P> {
    provider: Arc<P>,
    page_size: usize,
}

impl<P: GeoProvider> GeoBatch<P> {
    /// Creates a batch kind over `provider`. `page_size` is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    pub fn new(provider: Arc<P>, page_size: usize) -> Self {
        Self {
            provider,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    async fn run_page(
        &self,
        page: Vec<BatchQuery<String, GeoQuery>>,
    ) -> Vec<(String, BatchResult<GeoInfo>)> {
        let queries: Vec<GeoQuery> = page.iter().map(|q| q.query.clone()).collect();

        match self.provider.lookup_page(&queries).await {
            Ok(infos) => page
                .into_iter()
                .zip(infos)
                .map(|(q, info)| {
                    let result = info
                        .into_result(&q.query.query)
                        .map_err(BatchError::from);
                    (q.identity, result)
                })
                .collect(),
            Err(err) => {
                warn!(page_size = page.len(), error = %err, "geolocation page failed");
                let err = BatchError::from(err);
                page.into_iter()
                    .map(|q| (q.identity, Err(err.clone())))
                    .collect()
            }
        }
    }
}

#[async_trait]
impl<P: GeoProvider> BatchExecutor for GeoBatch<P> {
    type Identity = String;
    type Query = GeoQuery;
    type Value = GeoInfo;

    #[instrument(name = "geo_batch", skip_all, fields(queries = queries.len(), page_size = self.page_size))]
    async fn execute(
        &self,
        queries: Vec<BatchQuery<String, GeoQuery>>,
    ) -> BatchResult<BatchOutcome<String, GeoInfo>> {
        let mut pages = Vec::with_capacity(queries.len().div_ceil(self.page_size));
        let mut remaining = queries.into_iter().peekable();
        while remaining.peek().is_some() {
            pages.push(remaining.by_ref().take(self.page_size).collect::<Vec<_>>());
        }

        let outcome = join_all(pages.into_iter().map(|page| self.run_page(page)))
            .await
            .into_iter()
            .flatten()
            .collect();
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeoError;
    use std::sync::Mutex;

    // =========================================================================
    // Mock provider
    // =========================================================================

    /// Answers every address with its own country code, except addresses
    /// starting with "10." which fail, and pages containing `poison`.
    #[derive(Default)]
    struct MockProvider {
        pages: Mutex<Vec<Vec<String>>>,
        poison: Option<String>,
    }

    impl MockProvider {
        fn poisoned(address: &str) -> Self {
            Self {
                poison: Some(address.to_string()),
                ..Default::default()
            }
        }

        fn page_sizes(&self) -> Vec<usize> {
            let mut sizes: Vec<_> = self.pages.lock().unwrap().iter().map(Vec::len).collect();
            sizes.sort_unstable();
            sizes
        }
    }

    #[async_trait]
    impl GeoProvider for MockProvider {
        async fn lookup_page(&self, page: &[GeoQuery]) -> Result<Vec<GeoInfo>, GeoError> {
            let addresses: Vec<String> = page.iter().map(|q| q.query.clone()).collect();
            self.pages.lock().unwrap().push(addresses.clone());

            if let Some(poison) = &self.poison {
                if addresses.contains(poison) {
                    return Err(GeoError::Status { status: 503 });
                }
            }

            Ok(addresses
                .into_iter()
                .map(|address| {
                    if address.starts_with("10.") {
                        GeoInfo {
                            status: "fail".to_string(),
                            message: Some("private range".to_string()),
                            query: address,
                            ..Default::default()
                        }
                    } else {
                        GeoInfo {
                            status: "success".to_string(),
                            country_code: Some(format!("CC-{address}")),
                            query: address,
                            ..Default::default()
                        }
                    }
                })
                .collect())
        }
    }

    fn queries(addresses: &[&str]) -> Vec<BatchQuery<String, GeoQuery>> {
        addresses
            .iter()
            .map(|a| BatchQuery::new(a.to_string(), GeoQuery::new(*a)))
            .collect()
    }

    fn addresses(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("192.0.{}.{}", i / 256, i % 256)).collect()
    }

    // =========================================================================
    // Paging
    // =========================================================================

    #[tokio::test]
    async fn test_splits_queries_into_pages() {
        // Arrange
        let provider = Arc::new(MockProvider::default());
        let batch = GeoBatch::new(Arc::clone(&provider), 100);
        let all = addresses(250);
        let refs: Vec<&str> = all.iter().map(String::as_str).collect();

        // Act
        let outcome = batch.execute(queries(&refs)).await.unwrap();

        // Assert
        assert_eq!(outcome.len(), 250);
        assert_eq!(provider.page_sizes(), vec![50, 100, 100]);
        assert!(outcome.values().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_page_size_is_clamped() {
        let provider = Arc::new(MockProvider::default());

        assert_eq!(GeoBatch::new(Arc::clone(&provider), 0).page_size(), 1);
        assert_eq!(GeoBatch::new(Arc::clone(&provider), 500).page_size(), MAX_PAGE_SIZE);
        assert_eq!(GeoBatch::new(provider, 25).page_size(), 25);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_provider_call() {
        let provider = Arc::new(MockProvider::default());
        let batch = GeoBatch::new(Arc::clone(&provider), 10);

        let outcome = batch.execute(Vec::new()).await.unwrap();

        assert!(outcome.is_empty());
        assert!(provider.page_sizes().is_empty());
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[tokio::test]
    async fn test_failed_lookup_fails_only_its_address() {
        // Arrange
        let provider = Arc::new(MockProvider::default());
        let batch = GeoBatch::new(provider, 100);

        // Act
        let outcome = batch
            .execute(queries(&["8.8.8.8", "10.0.0.1"]))
            .await
            .unwrap();

        // Assert
        let located = outcome["8.8.8.8"].as_ref().unwrap();
        assert_eq!(located.country_code.as_deref(), Some("CC-8.8.8.8"));
        assert_eq!(
            outcome["10.0.0.1"],
            Err(BatchError::provider("lookup of 10.0.0.1 failed: private range"))
        );
    }

    #[tokio::test]
    async fn test_failed_page_fails_only_its_addresses() {
        // Arrange: pages of two, the second page carries the poisoned address
        let provider = Arc::new(MockProvider::poisoned("3.3.3.3"));
        let batch = GeoBatch::new(provider, 2);

        // Act
        let outcome = batch
            .execute(queries(&["1.1.1.1", "2.2.2.2", "3.3.3.3", "4.4.4.4", "5.5.5.5"]))
            .await
            .unwrap();

        // Assert
        assert!(outcome["1.1.1.1"].is_ok());
        assert!(outcome["2.2.2.2"].is_ok());
        assert!(outcome["5.5.5.5"].is_ok());
        let expected = BatchError::transport("geolocation provider returned status 503");
        assert_eq!(outcome["3.3.3.3"], Err(expected.clone()));
        assert_eq!(outcome["4.4.4.4"], Err(expected));
    }
}
