use crate::api::error::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Unexpected response shape from {url}")]
    UnexpectedShape {
        url: String,
        #[source]
        cause: serde_json::Error,
    },

    #[error("Work item '{0}' does not belong to the {1} source")]
    ForeignWorkItem(String, &'static str),
}
