use log::info;
use std::io;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "statcollect";

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR_NAME))
}

/// Creates the directory holding the database file if it does not exist yet.
pub fn ensure_parent_dir_exists(path: &Path) -> io::Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    match std::fs::metadata(parent) {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("Database parent exists but is not a directory: {}", parent.display()),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating database directory: {}", parent.display());
            std::fs::create_dir_all(parent)
        }
        Err(e) => Err(e),
    }
}
