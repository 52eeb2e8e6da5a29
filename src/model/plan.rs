use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow status of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Completed,
}

impl PlanStatus {
    pub const ALL: [PlanStatus; 4] = [
        PlanStatus::Todo,
        PlanStatus::InProgress,
        PlanStatus::Review,
        PlanStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Todo => "todo",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::Review => "review",
            PlanStatus::Completed => "completed",
        }
    }

    /// Parse a status string, accepting the legacy spellings older plans use.
    pub fn parse(s: &str) -> Option<PlanStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" | "pending" | "open" => Some(PlanStatus::Todo),
            "in_progress" | "in-progress" | "inprogress" | "doing" | "active" => {
                Some(PlanStatus::InProgress)
            }
            "review" | "in_review" | "in-review" => Some(PlanStatus::Review),
            "completed" | "complete" | "done" => Some(PlanStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plan priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl PlanPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanPriority::Low => "low",
            PlanPriority::Medium => "medium",
            PlanPriority::High => "high",
            PlanPriority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<PlanPriority> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(PlanPriority::Low),
            "medium" => Some(PlanPriority::Medium),
            "high" => Some(PlanPriority::High),
            "critical" => Some(PlanPriority::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for PlanPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskStatus {
    #[default]
    Todo,
    Done,
}

impl SubtaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubtaskStatus::Todo => "todo",
            SubtaskStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<SubtaskStatus> {
        match s.trim() {
            "todo" => Some(SubtaskStatus::Todo),
            "done" => Some(SubtaskStatus::Done),
            _ => None,
        }
    }
}

/// A checklist item stored in a plan's frontmatter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: SubtaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

/// Structured metadata from the YAML block at the top of a plan.
///
/// Every field is optional; an empty value means the key was absent (or
/// carried a value that could not be understood).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFrontmatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PlanStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PlanPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Subtask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
}

impl PlanFrontmatter {
    pub fn is_empty(&self) -> bool {
        *self == PlanFrontmatter::default()
    }

    /// Effective status (plans without one are treated as `todo`)
    pub fn status_or_default(&self) -> PlanStatus {
        self.status.unwrap_or_default()
    }
}

/// Plan metadata as shown in listings (no body)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMeta {
    /// Filename including extension, the unique key of a plan
    pub filename: String,
    /// First `# ` heading of the body
    pub title: String,
    /// RFC 3339
    pub created_at: String,
    /// RFC 3339
    pub modified_at: String,
    /// Modification time in milliseconds since the epoch
    pub mtime_ms: i64,
    pub size: u64,
    pub preview: String,
    pub sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontmatter: Option<PlanFrontmatter>,
}

impl PlanMeta {
    pub fn status(&self) -> PlanStatus {
        self.frontmatter
            .as_ref()
            .map(PlanFrontmatter::status_or_default)
            .unwrap_or_default()
    }
}

/// A fully loaded plan: metadata plus the markdown body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDetail {
    #[serde(flatten)]
    pub meta: PlanMeta,
    /// Markdown body without the frontmatter block
    pub content: String,
}

/// Outcome of a bulk operation; one failing plan does not abort the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkFailure {
    pub filename: String,
    pub error: String,
}
