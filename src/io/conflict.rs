use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Differences up to this many milliseconds are treated as the same mtime.
pub const MTIME_TOLERANCE_MS: i64 = 1;

const NANOS_PER_MS: i128 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileState {
    /// Nanoseconds since the epoch; compared at full precision
    pub mtime_ns: i128,
    pub size: u64,
}

impl FileState {
    pub fn of(path: &Path) -> std::io::Result<FileState> {
        let meta = std::fs::metadata(path)?;
        Ok(FileState {
            mtime_ns: meta.modified().map(nanos_since_epoch).unwrap_or(0),
            size: meta.len(),
        })
    }

    /// Whole milliseconds, as reported to callers
    pub fn mtime_ms(&self) -> i64 {
        self.mtime_ns.div_euclid(NANOS_PER_MS) as i64
    }
}

fn nanos_since_epoch(time: SystemTime) -> i128 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i128,
        Err(e) => -(e.duration().as_nanos() as i128),
    }
}

/// Milliseconds since the epoch (negative before it, 0 when unavailable)
pub fn mtime_ms(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .map(|t| nanos_since_epoch(t).div_euclid(NANOS_PER_MS) as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCheck {
    pub has_conflict: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_mtime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_mtime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConflictCheck {
    fn none() -> Self {
        ConflictCheck {
            has_conflict: false,
            last_known_mtime: None,
            current_mtime: None,
            message: None,
        }
    }
}

/// Remembers the last (mtime, size) this process saw for each plan.
/// Held in memory only.
#[derive(Debug, Default)]
pub struct ConflictTracker {
    records: Mutex<HashMap<String, FileState>>,
}

impl ConflictTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, filename: &str, state: FileState) {
        if let Ok(mut records) = self.records.lock() {
            records.insert(filename.to_string(), state);
        }
    }

    /// Record whatever is on disk now. A stat failure leaves the map alone.
    pub fn record_path(&self, filename: &str, path: &Path) {
        match FileState::of(path) {
            Ok(state) => self.record(filename, state),
            Err(e) => log::debug!("not recording state of {}: {}", path.display(), e),
        }
    }

    pub fn recorded(&self, filename: &str) -> Option<FileState> {
        self.records.lock().ok()?.get(filename).copied()
    }

    pub fn forget(&self, filename: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.remove(filename);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }

    /// Compare the recorded state with the file in `dir`. No record, or a
    /// file that cannot be stat'ed, is never a conflict.
    pub fn check_conflict(&self, filename: &str, dir: &Path) -> ConflictCheck {
        let Some(recorded) = self.recorded(filename) else {
            return ConflictCheck::none();
        };
        let Ok(current) = FileState::of(&dir.join(filename)) else {
            return ConflictCheck::none();
        };
        let tolerance = MTIME_TOLERANCE_MS as i128 * NANOS_PER_MS;
        if (current.mtime_ns - recorded.mtime_ns).abs() > tolerance {
            ConflictCheck {
                has_conflict: true,
                last_known_mtime: Some(recorded.mtime_ms()),
                current_mtime: Some(current.mtime_ms()),
                message: Some("File was modified externally".to_string()),
            }
        } else {
            ConflictCheck::none()
        }
    }
}
