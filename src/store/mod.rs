//! The shared SQLite store: one `countries` dimension table plus one
//! observation table per [`DataSource`](crate::DataSource).

pub mod error;
pub mod progress;
pub mod report;
pub mod schema;
pub mod writer;

use crate::utils::ensure_parent_dir_exists;
use error::StoreError;
use log::info;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

/// Handle on the shared database file.
///
/// The store is single-writer: one collection run holds it at a time, and
/// every insert is its own atomic statement, so an interrupted run leaves
/// only complete rows behind.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if needed) the database at `path` for reading and writing.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        ensure_parent_dir_exists(path)
            .map_err(|e| StoreError::DirCreation(path.to_path_buf(), e))?;
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| StoreError::Open(path.to_path_buf(), e))?;
        info!("Opened database {}", path.display());
        Ok(Self { conn })
    }

    /// Opens an existing database for report queries only; writes will fail.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| StoreError::Open(path.to_path_buf(), e))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Open(PathBuf::from(":memory:"), e))?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}
