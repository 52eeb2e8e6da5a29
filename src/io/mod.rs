pub mod archive_store;
pub mod backup_store;
pub mod config_io;
pub mod conflict;
pub mod error;
pub mod library;
pub mod notification_store;
pub mod plan_store;
pub mod recovery;
pub mod settings_store;
pub mod view_store;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use error::{ErrorKind, StoreError};
pub use library::Library;

/// Read a JSON dotfile. Missing or malformed files read as the default.
pub(crate) fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("could not read {}: {}", path.display(), e);
            }
            return T::default();
        }
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        log::warn!("ignoring malformed {}: {}", path.display(), e);
        T::default()
    })
}

/// Write a JSON dotfile (pretty-printed) atomically.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    recovery::atomic_write(path, json.as_bytes()).map_err(StoreError::io(path))
}

/// Rename, falling back to copy + remove across filesystems.
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<(), StoreError> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(StoreError::io(from))?;
    std::fs::remove_file(from).map_err(StoreError::io(from))
}
