use crate::io::recovery::RecoveryEntry;
use crate::model::archive::ArchiveEntry;
use crate::model::backup::BackupInfo;
use crate::model::notification::{Notification, Severity};
use crate::model::plan::{PlanDetail, PlanMeta, PlanStatus, Subtask, SubtaskStatus};
use crate::model::view::SavedView;
use crate::ops::deps::PlanDependencies;
use crate::ops::search::SearchResult;
use crate::util::unicode::fit_column;

/// Width of the filename column in listings
const FILENAME_COLUMN: usize = 28;
/// Width of the title column in listings
const TITLE_COLUMN: usize = 40;

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

fn status_char(status: PlanStatus) -> char {
    match status {
        PlanStatus::Todo => ' ',
        PlanStatus::InProgress => '>',
        PlanStatus::Review => '?',
        PlanStatus::Completed => 'x',
    }
}

pub fn parse_plan_status(s: &str) -> Result<PlanStatus, String> {
    PlanStatus::parse(s).ok_or_else(|| {
        format!(
            "invalid status: {} (expected todo, in_progress, review, completed)",
            s
        )
    })
}

/// `[>] filename  Title  !high due:2026-03-01 #tag`
pub fn format_plan_line(meta: &PlanMeta) -> String {
    let mut line = format!(
        "[{}] {} {}",
        status_char(meta.status()),
        fit_column(&meta.filename, FILENAME_COLUMN),
        fit_column(&meta.title, TITLE_COLUMN),
    );
    if let Some(fm) = &meta.frontmatter {
        if let Some(priority) = fm.priority {
            line.push_str(&format!(" !{}", priority.as_str()));
        }
        if let Some(due) = &fm.due_date {
            line.push_str(&format!(" due:{}", due.get(..10).unwrap_or(due)));
        }
        for tag in &fm.tags {
            line.push_str(&format!(" #{}", tag));
        }
    }
    line.trim_end().to_string()
}

pub fn format_subtask_line(subtask: &Subtask) -> String {
    let mark = match subtask.status {
        SubtaskStatus::Done => 'x',
        SubtaskStatus::Todo => ' ',
    };
    let mut line = format!("[{}] {} {}", mark, subtask.id, subtask.title);
    if let Some(assignee) = &subtask.assignee {
        line.push_str(&format!(" @{}", assignee));
    }
    if let Some(due) = &subtask.due_date {
        line.push_str(&format!(" due:{}", due));
    }
    line
}

/// Header fields followed by the body.
pub fn format_plan_detail(detail: &PlanDetail) -> Vec<String> {
    let meta = &detail.meta;
    let mut lines = vec![
        format!("{} ({})", meta.title, meta.filename),
        format!("  modified: {}", meta.modified_at),
        format!("  size: {} bytes", meta.size),
    ];
    if let Some(project) = &meta.related_project {
        lines.push(format!("  project: {}", project));
    }
    if let Some(fm) = &meta.frontmatter {
        lines.push(format!("  status: {}", fm.status_or_default()));
        if let Some(priority) = fm.priority {
            lines.push(format!("  priority: {}", priority.as_str()));
        }
        if let Some(due) = &fm.due_date {
            lines.push(format!("  due: {}", due));
        }
        if let Some(estimate) = &fm.estimate {
            lines.push(format!("  estimate: {}", estimate));
        }
        if let Some(assignee) = &fm.assignee {
            lines.push(format!("  assignee: {}", assignee));
        }
        if !fm.tags.is_empty() {
            lines.push(format!("  tags: {}", fm.tags.join(", ")));
        }
        if !fm.blocked_by.is_empty() {
            lines.push(format!("  blocked by: {}", fm.blocked_by.join(", ")));
        }
        if !fm.subtasks.is_empty() {
            lines.push("  subtasks:".to_string());
            for st in &fm.subtasks {
                lines.push(format!("    {}", format_subtask_line(st)));
            }
        }
    }
    lines.push(String::new());
    lines.extend(detail.content.lines().map(str::to_string));
    lines
}

// ---------------------------------------------------------------------------
// Search and dependencies
// ---------------------------------------------------------------------------

pub fn format_search_result(result: &SearchResult) -> Vec<String> {
    let mut lines = vec![format!(
        "{} - {} (score {})",
        result.filename, result.title, result.score
    )];
    for m in &result.matches {
        lines.push(format!("  {:>4}: {}", m.line, m.highlight));
    }
    lines
}

pub fn format_plan_dependencies(deps: &PlanDependencies) -> Vec<String> {
    let list = |items: &[String]| {
        if items.is_empty() {
            "-".to_string()
        } else {
            items.join(", ")
        }
    };
    vec![
        deps.filename.clone(),
        format!("  references:    {}", list(&deps.references)),
        format!("  referenced by: {}", list(&deps.referenced_by)),
        format!("  chain:         {}", deps.chain.join(" -> ")),
        format!("  unresolved:    {}", list(&deps.unresolved)),
    ]
}

// ---------------------------------------------------------------------------
// Archive, notifications, views, recovery
// ---------------------------------------------------------------------------

pub fn format_archive_entry(entry: &ArchiveEntry) -> String {
    format!(
        "{} {} (archived {}, expires {})",
        fit_column(&entry.filename, FILENAME_COLUMN),
        entry.title,
        entry.archived_at.get(..10).unwrap_or(&entry.archived_at),
        entry.expires_at.get(..10).unwrap_or(&entry.expires_at),
    )
}

/// `<id>  3 plan(s)  1.2 KB`
pub fn format_backup(backup: &BackupInfo) -> String {
    let size = if backup.size >= 1024 {
        format!("{:.1} KB", backup.size as f64 / 1024.0)
    } else {
        format!("{} B", backup.size)
    };
    format!("{}  {} plan(s)  {}", backup.id, backup.plan_count, size)
}

pub fn format_notification(n: &Notification) -> String {
    let severity = match n.severity {
        Severity::Critical => "!!",
        Severity::Warning => "! ",
        Severity::Info => "  ",
    };
    let unread = if n.read { ' ' } else { '*' };
    format!("{}{} {} {}", unread, severity, n.id, n.message)
}

pub fn format_view(view: &SavedView) -> String {
    let kind = if view.is_preset { "preset" } else { "custom" };
    let query = view.to_query();
    if query.is_empty() {
        format!("{} {} ({})", fit_column(&view.id, FILENAME_COLUMN), view.name, kind)
    } else {
        format!(
            "{} {} ({}) [{}]",
            fit_column(&view.id, FILENAME_COLUMN),
            view.name,
            kind,
            query
        )
    }
}

pub fn format_recovery_entries(entries: &[RecoveryEntry]) -> String {
    entries
        .iter()
        .map(RecoveryEntry::to_display_markdown)
        .collect()
}
