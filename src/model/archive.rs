use serde::{Deserialize, Serialize};

/// Metadata kept for an archived plan in `<archive_dir>/.meta.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub filename: String,
    /// RFC 3339
    pub archived_at: String,
    /// RFC 3339; after this instant cleanup deletes the file
    pub expires_at: String,
    /// Full path the plan lived at before archiving
    pub original_path: String,
    pub title: String,
    pub preview: String,
}
