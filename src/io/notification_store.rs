use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use crate::io::error::StoreError;
use crate::io::{read_json_or_default, write_json};

pub const READ_FILENAME: &str = ".notifications-read.json";

/// Ids of notifications the user has dismissed. Notifications themselves
/// are derived on demand; only this set is persisted.
#[derive(Debug, Clone)]
pub struct ReadStore {
    path: PathBuf,
}

impl ReadStore {
    pub fn new(plans_dir: &Path) -> Self {
        ReadStore {
            path: plans_dir.join(READ_FILENAME),
        }
    }

    pub fn read_ids(&self) -> IndexSet<String> {
        read_json_or_default(&self.path)
    }

    /// Idempotent: marking an already-read id leaves the file unchanged.
    pub fn mark_read(&self, id: &str) -> Result<(), StoreError> {
        self.mark_many(std::iter::once(id.to_string()))
    }

    pub fn mark_many(&self, ids: impl IntoIterator<Item = String>) -> Result<(), StoreError> {
        let mut read = self.read_ids();
        let before = read.len();
        read.extend(ids);
        if read.len() != before {
            write_json(&self.path, &read)?;
        }
        Ok(())
    }

    /// Forget ids outside `current`. Returns how many were dropped.
    pub fn retain(&self, current: &IndexSet<String>) -> Result<usize, StoreError> {
        let mut read = self.read_ids();
        let before = read.len();
        read.retain(|id| current.contains(id));
        let dropped = before - read.len();
        if dropped > 0 {
            write_json(&self.path, &read)?;
        }
        Ok(dropped)
    }

    /// Replace the stored set with exactly `ids`.
    pub fn replace(&self, ids: IndexSet<String>) -> Result<(), StoreError> {
        if self.read_ids() != ids {
            write_json(&self.path, &ids)?;
        }
        Ok(())
    }
}
