use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    /// A 4xx other than 429: the request itself is wrong, retrying won't help.
    #[error("HTTP request to {url} was rejected with status {status}")]
    Rejected {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("HTTP request to {url} failed with server status {status}")]
    ServerStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("HTTP request to {url} was throttled")]
    Throttled { url: String },

    #[error("Giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Failed to decode JSON body from {0}")]
    Decode(String, #[source] reqwest::Error),
}

impl ApiError {
    /// Whether the upstream said the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Rejected { status, .. } if *status == reqwest::StatusCode::NOT_FOUND)
    }
}
