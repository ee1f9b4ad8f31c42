use crate::api::error::ApiError;
use crate::config::error::ConfigError;
use crate::sources::error::SourceError;
use crate::store::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Source(#[from] SourceError),
}
