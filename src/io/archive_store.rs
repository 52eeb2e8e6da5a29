use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use indexmap::IndexMap;

use crate::io::error::StoreError;
use crate::io::{move_file, read_json_or_default, write_json};
use crate::model::archive::ArchiveEntry;
use crate::parse::{extract_preview, extract_title, parse_document};

pub const META_FILENAME: &str = ".meta.json";

/// Archived plans live as plain files in `dir`, with their metadata in
/// `<dir>/.meta.json` keyed by filename.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    dir: PathBuf,
    retention_days: i64,
    preview_length: usize,
}

impl ArchiveStore {
    pub fn new(dir: impl Into<PathBuf>, retention_days: i64, preview_length: usize) -> Self {
        ArchiveStore {
            dir: dir.into(),
            retention_days,
            preview_length,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILENAME)
    }

    fn read_meta(&self) -> IndexMap<String, ArchiveEntry> {
        read_json_or_default(&self.meta_path())
    }

    fn write_meta(&self, meta: &IndexMap<String, ArchiveEntry>) -> Result<(), StoreError> {
        write_json(&self.meta_path(), meta)
    }

    /// Move `source` into the archive and record its metadata. An archived
    /// plan of the same name is never overwritten.
    pub fn archive(
        &self,
        filename: &str,
        source: &Path,
        now: DateTime<Utc>,
    ) -> Result<ArchiveEntry, StoreError> {
        let target = self.dir.join(filename);
        if target.exists() {
            log::warn!("not archiving {}: archive already holds that name", filename);
            return Err(StoreError::AlreadyArchived(filename.to_string()));
        }
        let content = std::fs::read_to_string(source).map_err(StoreError::io(source))?;
        std::fs::create_dir_all(&self.dir).map_err(StoreError::io(&self.dir))?;
        move_file(source, &target)?;

        let body = parse_document(&content).body;
        let entry = ArchiveEntry {
            filename: filename.to_string(),
            archived_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            expires_at: (now + Duration::days(self.retention_days))
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            original_path: source.display().to_string(),
            title: extract_title(body),
            preview: extract_preview(body, self.preview_length),
        };

        let mut meta = self.read_meta();
        meta.insert(filename.to_string(), entry.clone());
        self.write_meta(&meta)?;
        log::info!("archived {}", filename);
        Ok(entry)
    }

    /// Archived plans whose files still exist, newest first.
    pub fn list(&self) -> Vec<ArchiveEntry> {
        let mut entries: Vec<ArchiveEntry> = self
            .read_meta()
            .into_values()
            .filter(|e| self.dir.join(&e.filename).is_file())
            .collect();
        entries.sort_by(|a, b| {
            parse_time(&b.archived_at)
                .cmp(&parse_time(&a.archived_at))
                .then_with(|| a.filename.cmp(&b.filename))
        });
        entries
    }

    pub fn get(&self, filename: &str) -> Option<ArchiveEntry> {
        self.read_meta().shift_remove(filename)
    }

    /// Content of an archived plan.
    pub fn read(&self, filename: &str) -> Result<String, StoreError> {
        let archived = self.dir.join(filename);
        if !archived.is_file() {
            return Err(StoreError::ArchiveNotFound(filename.to_string()));
        }
        std::fs::read_to_string(&archived).map_err(StoreError::io(&archived))
    }

    /// Move an archived plan back to where it came from (or to
    /// `fallback_dir` when that directory is gone). Returns the restored path.
    pub fn restore(&self, filename: &str, fallback_dir: &Path) -> Result<PathBuf, StoreError> {
        let archived = self.dir.join(filename);
        if !archived.is_file() {
            return Err(StoreError::ArchiveNotFound(filename.to_string()));
        }

        let mut meta = self.read_meta();
        let target = meta
            .get(filename)
            .map(|e| PathBuf::from(&e.original_path))
            .filter(|p| p.parent().is_some_and(Path::is_dir))
            .unwrap_or_else(|| fallback_dir.join(filename));
        if target.exists() {
            return Err(StoreError::AlreadyExists(filename.to_string()));
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
        }

        move_file(&archived, &target)?;
        meta.shift_remove(filename);
        self.write_meta(&meta)?;
        log::info!("restored {} to {}", filename, target.display());
        Ok(target)
    }

    /// Delete an archived plan for good. Returns its last content.
    pub fn delete(&self, filename: &str) -> Result<String, StoreError> {
        let archived = self.dir.join(filename);
        if !archived.is_file() {
            return Err(StoreError::ArchiveNotFound(filename.to_string()));
        }
        let content = std::fs::read_to_string(&archived).map_err(StoreError::io(&archived))?;
        std::fs::remove_file(&archived).map_err(StoreError::io(&archived))?;

        let mut meta = self.read_meta();
        meta.shift_remove(filename);
        self.write_meta(&meta)?;
        log::info!("deleted archived plan {}", filename);
        Ok(content)
    }

    /// Delete every entry whose expiry is at or before `now`. Returns how
    /// many were removed.
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let meta = self.read_meta();
        let mut kept = IndexMap::new();
        let mut removed = 0;
        let mut changed = false;

        for (filename, entry) in meta {
            let expired = parse_time(&entry.expires_at).is_some_and(|t| t <= now);
            if !expired {
                kept.insert(filename, entry);
                continue;
            }
            let path = self.dir.join(&filename);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    changed = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => changed = true,
                Err(e) => {
                    log::warn!("could not delete expired {}: {}", path.display(), e);
                    kept.insert(filename, entry);
                }
            }
        }

        if changed {
            self.write_meta(&kept)?;
        }
        if removed > 0 {
            log::info!("removed {} expired archived plan(s)", removed);
        }
        Ok(removed)
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
