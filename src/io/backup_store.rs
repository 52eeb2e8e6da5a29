use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::io::error::StoreError;
use crate::io::write_json;
use crate::model::backup::{BackupInfo, PlanFile};

pub const BACKUPS_DIRNAME: &str = ".backups";

/// A backup file: every plan's full content at one instant.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupFile {
    id: String,
    created_at: String,
    plan_count: usize,
    plans: Vec<PlanFile>,
}

/// Header fields only, for listing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupSummary {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    plan_count: usize,
}

/// JSON snapshots of the plan library in `<plans_dir>/.backups`.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(plans_dir: &Path) -> Self {
        BackupStore {
            dir: plans_dir.join(BACKUPS_DIRNAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a new backup of `plans`. Ids are the creation time with `:`
    /// and `.` replaced, suffixed when two backups share a millisecond.
    pub fn create(&self, plans: Vec<PlanFile>, now: DateTime<Utc>) -> Result<BackupInfo, StoreError> {
        let stamp = now.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string();
        let mut id = stamp.clone();
        let mut n = 1;
        while self.path_for(&id).exists() {
            id = format!("{}-{}", stamp, n);
            n += 1;
        }

        let backup = BackupFile {
            id: id.clone(),
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            plan_count: plans.len(),
            plans,
        };
        let path = self.path_for(&id);
        write_json(&path, &backup)?;
        let size = std::fs::metadata(&path).map_err(StoreError::io(&path))?.len();
        log::info!("backed up {} plan(s) to {}", backup.plan_count, path.display());

        Ok(BackupInfo {
            filename: format!("{}.json", id),
            id,
            created_at: backup.created_at,
            plan_count: backup.plan_count,
            size,
        })
    }

    /// Every readable backup, newest first.
    pub fn list(&self) -> Vec<BackupInfo> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut backups: Vec<BackupInfo> = entries
            .flatten()
            .filter_map(|entry| {
                let filename = entry.file_name().into_string().ok()?;
                let stem = filename.strip_suffix(".json")?.to_string();
                let path = entry.path();
                let text = std::fs::read_to_string(&path).ok()?;
                let summary: BackupSummary = serde_json::from_str(&text)
                    .map_err(|e| log::warn!("skipping backup {}: {}", path.display(), e))
                    .ok()?;
                let created_at = summary.created_at.or_else(|| {
                    let modified = entry.metadata().ok()?.modified().ok()?;
                    Some(DateTime::<Utc>::from(modified).to_rfc3339_opts(SecondsFormat::Millis, true))
                })?;
                Some(BackupInfo {
                    id: summary.id.unwrap_or(stem),
                    created_at,
                    plan_count: summary.plan_count,
                    size: text.len() as u64,
                    filename,
                })
            })
            .collect();
        backups.sort_by(|a, b| {
            parse_time(&b.created_at)
                .cmp(&parse_time(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        backups
    }

    /// The plans stored in backup `id`.
    pub fn load(&self, id: &str) -> Result<Vec<PlanFile>, StoreError> {
        let path = self.path_for(id);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::BackupNotFound(id.to_string()));
            }
            Err(e) => return Err(StoreError::Io { path, source: e }),
        };
        let backup: BackupFile = serde_json::from_str(&text)
            .map_err(|e| StoreError::Invalid(format!("invalid backup format: {}", e)))?;
        Ok(backup.plans)
    }

    /// Ids are reduced to `[A-Za-z0-9_-]` so they always name a file
    /// inside the backups directory.
    fn path_for(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
