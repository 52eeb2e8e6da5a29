use serde::{Deserialize, Serialize};

use crate::io::StoreError;
use crate::model::plan::{PlanFrontmatter, Subtask, SubtaskStatus};

/// Fields of a subtask a caller supplies; the id is generated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubtask {
    pub title: String,
    #[serde(default)]
    pub status: Option<SubtaskStatus>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Partial update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<SubtaskStatus>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum SubtaskAction {
    Add {
        subtask: NewSubtask,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        subtask_id: String,
        subtask: SubtaskPatch,
    },
    #[serde(rename_all = "camelCase")]
    Delete { subtask_id: String },
    #[serde(rename_all = "camelCase")]
    Toggle { subtask_id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SubtaskOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask: Option<Subtask>,
}

/// `st-` followed by 8 hex characters
pub fn new_subtask_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("st-{}", &hex[..8])
}

fn position(fm: &PlanFrontmatter, id: &str) -> Result<usize, StoreError> {
    fm.subtasks
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| StoreError::SubtaskNotFound(id.to_string()))
}

/// Apply one action to the subtask list. Returns the affected subtask
/// (`None` for deletions).
pub fn apply(fm: &mut PlanFrontmatter, action: SubtaskAction) -> Result<Option<Subtask>, StoreError> {
    match action {
        SubtaskAction::Add { subtask } => {
            let title = subtask.title.trim();
            if title.is_empty() {
                return Err(StoreError::Invalid("subtask title is required".into()));
            }
            let created = Subtask {
                id: new_subtask_id(),
                title: title.to_string(),
                status: subtask.status.unwrap_or_default(),
                assignee: subtask.assignee,
                due_date: subtask.due_date,
            };
            fm.subtasks.push(created.clone());
            Ok(Some(created))
        }
        SubtaskAction::Update { subtask_id, subtask } => {
            let idx = position(fm, &subtask_id)?;
            let target = &mut fm.subtasks[idx];
            if let Some(title) = subtask.title {
                target.title = title;
            }
            if let Some(status) = subtask.status {
                target.status = status;
            }
            if subtask.assignee.is_some() {
                target.assignee = subtask.assignee;
            }
            if subtask.due_date.is_some() {
                target.due_date = subtask.due_date;
            }
            Ok(Some(target.clone()))
        }
        SubtaskAction::Delete { subtask_id } => {
            let idx = position(fm, &subtask_id)?;
            fm.subtasks.remove(idx);
            Ok(None)
        }
        SubtaskAction::Toggle { subtask_id } => {
            let idx = position(fm, &subtask_id)?;
            let target = &mut fm.subtasks[idx];
            target.status = match target.status {
                SubtaskStatus::Todo => SubtaskStatus::Done,
                SubtaskStatus::Done => SubtaskStatus::Todo,
            };
            Ok(Some(target.clone()))
        }
    }
}

/// (done, total)
pub fn progress(fm: &PlanFrontmatter) -> (usize, usize) {
    let done = fm
        .subtasks
        .iter()
        .filter(|s| s.status == SubtaskStatus::Done)
        .count();
    (done, fm.subtasks.len())
}
