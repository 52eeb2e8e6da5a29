use serde::{Deserialize, Serialize};

/// A plan as a bare filename and full file content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFile {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFailure {
    pub filename: String,
    pub error: String,
}

/// Outcome of importing a batch of plan files. Existing plans are never
/// overwritten; they count as skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportFailure>,
}

/// Summary of one backup file under `<plans_dir>/.backups`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub id: String,
    /// RFC 3339
    pub created_at: String,
    pub plan_count: usize,
    /// Bytes on disk
    pub size: u64,
    pub filename: String,
}
