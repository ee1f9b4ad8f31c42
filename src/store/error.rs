use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create database directory for '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to open database '{0}'")]
    Open(PathBuf, #[source] rusqlite::Error),

    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: i64, supported: i64 },

    #[error("Cannot migrate table '{table}': {message}")]
    Migration { table: String, message: String },

    #[error("Database operation failed")]
    Sqlite(#[from] rusqlite::Error),
}
