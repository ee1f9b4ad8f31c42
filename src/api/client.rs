//! HTTP client shared by the source adapters: one instance per upstream
//! service, carrying that service's base URL, key, pacing and retry policy.

use crate::api::error::ApiError;
use crate::api::retry::{classify, with_retry, AttemptError, Pacer, RetryPolicy, StatusClass};
use bon::bon;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// How a static API key is attached to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKey {
    /// Sent as a query parameter, e.g. `appid=<key>`.
    Query { name: String, value: String },
    /// Sent as a request header, e.g. `X-API-Key: <key>`.
    Header { name: String, value: String },
}

/// A rate-limited JSON client for one external data source.
///
/// Every call waits for the source's minimum inter-request delay, carries a
/// timeout, and is retried with linear backoff on throttling (429), server
/// errors and network failures. Other 4xx responses fail immediately.
///
/// # Examples
///
/// ```no_run
/// # use statcollect::{ApiClient, ApiError, ApiKey};
/// # use std::time::Duration;
/// # #[tokio::main]
/// # async fn main() -> Result<(), ApiError> {
/// let client = ApiClient::builder()
///     .name("openaq")
///     .base_url("https://api.openaq.org/v3")
///     .api_key(ApiKey::Header {
///         name: "X-API-Key".to_string(),
///         value: "secret".to_string(),
///     })
///     .min_request_delay(Duration::from_secs(1))
///     .build()?;
///
/// let body = client.request("locations", &[("iso", "DE".to_string())]).await?;
/// println!("{}", body["results"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ApiClient {
    name: String,
    base_url: String,
    http: Client,
    api_key: Option<ApiKey>,
    pacer: Pacer,
    retry: RetryPolicy,
}

#[bon]
impl ApiClient {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        #[builder(into)] base_url: String,
        api_key: Option<ApiKey>,
        min_request_delay: Option<Duration>,
        timeout: Option<Duration>,
        retry: Option<RetryPolicy>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(ApiError::ClientBuild)?;
        Ok(Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            api_key,
            pacer: Pacer::new(min_request_delay.unwrap_or(Duration::ZERO)),
            retry: retry.unwrap_or_default(),
        })
    }
}

impl ApiClient {
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Issues a GET to `path` (relative to the base URL) and returns the parsed JSON body.
    ///
    /// # Errors
    ///
    /// * [`ApiError::Rejected`] for a 4xx other than 429, after a single attempt.
    /// * [`ApiError::RetriesExhausted`] when every attempt was throttled, hit a
    ///   server error or failed on the network.
    /// * [`ApiError::Decode`] when a 2xx body is not valid JSON.
    pub async fn request(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = self.url_for(path);
        let target = url.as_str();
        with_retry(&self.retry, target, move |attempt| {
            self.attempt(target, query, attempt)
        })
        .await
    }

    async fn attempt(
        &self,
        url: &str,
        query: &[(&str, String)],
        attempt: u32,
    ) -> Result<Value, AttemptError> {
        self.pacer.wait_turn().await;
        debug!("[{}] GET {} (attempt {})", self.name, url, attempt);

        let mut request = self.http.get(url).query(query);
        match &self.api_key {
            Some(ApiKey::Query { name, value }) => {
                request = request.query(&[(name.as_str(), value.as_str())]);
            }
            Some(ApiKey::Header { name, value }) => {
                request = request.header(name.as_str(), value.as_str());
            }
            None => {}
        }

        let response = request.send().await.map_err(|e| {
            AttemptError::Retryable(ApiError::NetworkRequest(url.to_string(), e))
        })?;

        let status = response.status();
        match classify(status) {
            StatusClass::Success => response
                .json::<Value>()
                .await
                .map_err(|e| AttemptError::Fatal(ApiError::Decode(url.to_string(), e))),
            StatusClass::Throttled => Err(AttemptError::Retryable(ApiError::Throttled {
                url: url.to_string(),
            })),
            StatusClass::ServerError => Err(AttemptError::Retryable(ApiError::ServerStatus {
                url: url.to_string(),
                status,
            })),
            StatusClass::Rejected => Err(AttemptError::Fatal(ApiError::Rejected {
                url: url.to_string(),
                status,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn fast_client(server: &MockServer, api_key: Option<ApiKey>) -> ApiClient {
        ApiClient::builder()
            .name("test")
            .base_url(server.base_url())
            .maybe_api_key(api_key)
            .retry(RetryPolicy::new(3, Duration::from_millis(1)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn returns_parsed_json_on_success() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/weather").query_param("q", "Osaka,JP");
                then.status(200).json_body(json!({ "name": "Osaka" }));
            })
            .await;

        let client = fast_client(&server, None);
        let body = client
            .request("/weather", &[("q", "Osaka,JP".to_string())])
            .await
            .unwrap();

        assert_eq!(body["name"], "Osaka");
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn attaches_query_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/weather").query_param("appid", "k1");
                then.status(200).json_body(json!({}));
            })
            .await;

        let key = ApiKey::Query {
            name: "appid".to_string(),
            value: "k1".to_string(),
        };
        fast_client(&server, Some(key))
            .request("weather", &[])
            .await
            .unwrap();
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn attaches_header_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/locations").header("X-API-Key", "k2");
                then.status(200).json_body(json!({ "results": [] }));
            })
            .await;

        let key = ApiKey::Header {
            name: "X-API-Key".to_string(),
            value: "k2".to_string(),
        };
        fast_client(&server, Some(key))
            .request("locations", &[])
            .await
            .unwrap();
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn client_errors_fail_without_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/weather");
                then.status(404).json_body(json!({ "message": "city not found" }));
            })
            .await;

        let result = fast_client(&server, None).request("weather", &[]).await;

        let err = result.unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err:?}");
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn server_errors_are_retried_up_to_max_attempts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/weather");
                then.status(503);
            })
            .await;

        let result = fast_client(&server, None).request("weather", &[]).await;

        assert!(matches!(
            result,
            Err(ApiError::RetriesExhausted { attempts: 3, .. })
        ));
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn throttling_is_retried_up_to_max_attempts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/weather");
                then.status(429);
            })
            .await;

        let result = fast_client(&server, None).request("weather", &[]).await;

        assert!(matches!(result, Err(ApiError::RetriesExhausted { .. })));
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn succeeds_once_throttling_stops() {
        let server = MockServer::start_async().await;
        let mut throttled = server
            .mock_async(|when, then| {
                when.method(GET).path("/weather");
                then.status(429);
            })
            .await;
        let client = ApiClient::builder()
            .name("test")
            .base_url(server.base_url())
            .retry(RetryPolicy::new(3, Duration::from_millis(300)))
            .build()
            .unwrap();

        // Swap the 429 for a 200 while the client waits out its first backoff.
        let lift_throttle = async {
            while throttled.hits_async().await == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            throttled.delete_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/weather");
                    then.status(200).json_body(json!({ "name": "Osaka" }));
                })
                .await
        };
        let (result, ok) = tokio::join!(client.request("weather", &[]), lift_throttle);

        assert_eq!(result.unwrap()["name"], "Osaka");
        ok.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_failure() {
        let client = ApiClient::builder()
            .name("test")
            .base_url("http://127.0.0.1:1")
            .retry(RetryPolicy::new(2, Duration::from_millis(1)))
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        let result = client.request("anything", &[]).await;
        match result {
            Err(ApiError::RetriesExhausted { attempts, last_error, .. }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("Network request failed"));
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }

    #[test]
    fn joins_base_url_and_path() {
        let client = ApiClient::builder()
            .name("test")
            .base_url("https://api.example.org/v2/")
            .build()
            .unwrap();
        assert_eq!(
            client.url_for("/country/USA"),
            "https://api.example.org/v2/country/USA"
        );
    }
}
