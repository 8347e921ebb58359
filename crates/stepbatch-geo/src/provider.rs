//! Geolocation providers.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::GeoError;
use crate::info::{GeoInfo, GeoQuery};

/// Resolves one page of queries in a single provider call.
///
/// Implementations answer every query of the page, in page order.
#[async_trait]
pub trait GeoProvider: Send + Sync + 'static {
    async fn lookup_page(&self, page: &[GeoQuery]) -> Result<Vec<GeoInfo>, GeoError>;
}

/// Provider backed by the ip-api.com batch endpoint.
#[derive(Debug, Clone)]
pub struct IpApiProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl IpApiProvider {
    /// Creates a provider posting to `endpoint` with a per-request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    #[instrument(skip(self, page), fields(endpoint = %self.endpoint, page_size = page.len()))]
    async fn lookup_page(&self, page: &[GeoQuery]) -> Result<Vec<GeoInfo>, GeoError> {
        let response = self.client.post(&self.endpoint).json(page).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Status {
                status: status.as_u16(),
            });
        }

        let infos: Vec<GeoInfo> = response.json().await?;
        if infos.len() != page.len() {
            return Err(GeoError::PageMismatch {
                expected: page.len(),
                actual: infos.len(),
            });
        }

        debug!(located = infos.iter().filter(|i| i.is_success()).count(), "page resolved");
        Ok(infos)
    }
}
