//! Per-source request construction and response-to-observation mapping.

pub mod air_quality;
pub mod economic;
pub mod error;
pub mod synthetic;
pub mod weather;

use crate::api::client::{ApiClient, ApiKey};
use crate::api::error::ApiError;
use crate::api::retry::RetryPolicy;
use crate::config::HttpConfig;
use crate::types::country::Country;
use crate::types::observation::Observation;
use crate::types::source::DataSource;
use crate::types::work_item::WorkItem;
use error::SourceError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// A data source the collector can enumerate and fetch from.
///
/// Implementations own their [`ApiClient`] and any per-run response caches.
#[allow(async_fn_in_trait)]
pub trait SourceAdapter {
    fn source(&self) -> DataSource;

    /// Candidate work items for `country`, best candidates first, at most `limit`.
    async fn list_work_items(
        &self,
        country: &Country,
        limit: usize,
    ) -> Result<Vec<WorkItem>, SourceError>;

    /// Fetches one work item. `Ok(None)` means the source has no data for it.
    async fn fetch_observation(&self, item: &WorkItem) -> Result<Option<Observation>, SourceError>;
}

pub(crate) fn build_client(
    name: &str,
    base_url: &str,
    api_key: Option<ApiKey>,
    min_request_delay_ms: u64,
    http: &HttpConfig,
) -> Result<ApiClient, ApiError> {
    ApiClient::builder()
        .name(name)
        .base_url(base_url)
        .maybe_api_key(api_key)
        .min_request_delay(Duration::from_millis(min_request_delay_ms))
        .timeout(http.timeout())
        .retry(RetryPolicy::new(http.max_attempts, http.backoff_base()))
        .build()
}

/// Deserializes a response body, reporting the URL it came from on mismatch.
pub(crate) fn parse<T: DeserializeOwned>(body: Value, url: String) -> Result<T, SourceError> {
    serde_json::from_value(body).map_err(|cause| SourceError::UnexpectedShape { url, cause })
}
