use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

/// Size at which the log is trimmed of old entries before appending (1 MB).
const MAX_LOG_SIZE: u64 = 1_048_576;

/// Default number of days before entries are prunable.
pub const PRUNE_AGE_DAYS: i64 = 30;

/// Written at the top of a new recovery log.
const FILE_HEADER: &str = "\
<!-- planbook recovery log: plan content that could not be saved
     or was removed for good. Copy anything you need back by hand.
     View with: pb recovery
     Prune old entries: pb recovery prune
     Safe to delete if empty or stale. -->

---
";

const HEADER_SEPARATOR: &str = " - ";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    /// An update was rejected because the file changed underneath
    Conflict,
    /// Writing the plan failed
    Write,
    /// A plan was permanently deleted
    Delete,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Conflict => write!(f, "conflict"),
            RecoveryCategory::Write => write!(f, "write"),
            RecoveryCategory::Delete => write!(f, "delete"),
        }
    }
}

impl RecoveryCategory {
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "conflict" => Some(RecoveryCategory::Conflict),
            "write" => Some(RecoveryCategory::Write),
            "delete" => Some(RecoveryCategory::Delete),
            _ => None,
        }
    }
}

/// A single entry in the recovery log.
#[derive(Debug, Clone)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

/// Return the path to the recovery log file.
pub fn recovery_log_path(plans_dir: &Path) -> PathBuf {
    plans_dir.join(".recovery.log")
}

// ---------------------------------------------------------------------------
// Atomic file write
// ---------------------------------------------------------------------------

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry formatting
// ---------------------------------------------------------------------------

/// A backtick fence longer than any backtick run inside `body`.
fn fence_for(body: &str) -> String {
    let longest = body
        .lines()
        .map(|line| line.chars().take_while(|&c| c == '`').count())
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

/// Length of the backtick run opening a fence on this line, if any.
fn opening_fence(line: &str) -> Option<usize> {
    let run = line.chars().take_while(|&c| c == '`').count();
    (run >= 3).then_some(run)
}

/// A fence closes only on a line of exactly the opening run.
fn closes_fence(line: &str, run: usize) -> bool {
    let line = line.trim_end();
    line.len() == run && line.chars().all(|c| c == '`')
}

impl RecoveryEntry {
    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {}{}{}: {}\n\n",
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            HEADER_SEPARATOR,
            self.category,
            self.description,
        );

        for (key, value) in &self.fields {
            out.push_str(&format!("{}: {}\n", key, value));
        }

        if !self.body.is_empty() {
            let fence = fence_for(&self.body);
            out.push_str(&format!("\n{}text\n", fence));
            out.push_str(&self.body);
            if !self.body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&fence);
            out.push('\n');
        }

        out.push_str("\n---\n");
        out
    }

    pub fn to_display_markdown(&self) -> String {
        self.to_markdown()
    }

    /// JSON form for `pb recovery --json`
    pub fn to_json(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();

        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "category": self.category.to_string(),
            "description": self.description,
            "fields": fields,
            "body": self.body,
        })
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Append a recovery entry to the log. Failures are logged, never returned.
pub fn log_recovery(plans_dir: &Path, entry: RecoveryEntry) {
    if let Err(e) = log_recovery_inner(plans_dir, entry) {
        log::warn!("could not write to recovery log: {}", e);
    }
}

fn log_recovery_inner(plans_dir: &Path, entry: RecoveryEntry) -> io::Result<()> {
    std::fs::create_dir_all(plans_dir)?;
    let path = recovery_log_path(plans_dir);

    if let Ok(meta) = std::fs::metadata(&path)
        && meta.len() > MAX_LOG_SIZE
    {
        trim_old_entries(&path);
    }

    let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if needs_header {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())?;
    Ok(())
}

fn trim_old_entries(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let cutoff = Utc::now() - chrono::Duration::days(PRUNE_AGE_DAYS);
    let trimmed = prune_entries_before(&content, &cutoff);
    if trimmed.len() < content.len()
        && let Err(e) = atomic_write(path, trimmed.as_bytes())
    {
        log::warn!("could not trim recovery log: {}", e);
    }
}

fn plan_entry(
    category: RecoveryCategory,
    description: String,
    filename: &str,
    extra: Option<(&str, String)>,
    content: &str,
) -> RecoveryEntry {
    let mut fields = vec![("Plan".to_string(), filename.to_string())];
    if let Some((key, value)) = extra {
        fields.push((key.to_string(), value));
    }
    RecoveryEntry {
        timestamp: Utc::now(),
        category,
        description,
        fields,
        body: content.to_string(),
    }
}

/// Keep content that failed to write.
pub fn log_failed_write(plans_dir: &Path, filename: &str, error: &str, content: &str) {
    log_recovery(
        plans_dir,
        plan_entry(
            RecoveryCategory::Write,
            format!("write to {} failed", filename),
            filename,
            Some(("Error", error.to_string())),
            content,
        ),
    );
}

/// Keep content of an update rejected by the conflict check.
pub fn log_conflict(plans_dir: &Path, filename: &str, current_mtime: i64, content: &str) {
    log_recovery(
        plans_dir,
        plan_entry(
            RecoveryCategory::Conflict,
            format!("update to {} rejected", filename),
            filename,
            Some(("Current-Mtime", current_mtime.to_string())),
            content,
        ),
    );
}

/// Keep the last content of a permanently deleted plan.
pub fn log_plan_deletion(plans_dir: &Path, filename: &str, content: &str) {
    log_recovery(
        plans_dir,
        plan_entry(
            RecoveryCategory::Delete,
            format!("{} deleted", filename),
            filename,
            None,
            content,
        ),
    );
}

// ---------------------------------------------------------------------------
// Reading entries
// ---------------------------------------------------------------------------

/// Read entries, most recent first.
pub fn read_recovery_entries(
    plans_dir: &Path,
    limit: Option<usize>,
    since: Option<DateTime<Utc>>,
) -> Vec<RecoveryEntry> {
    let Ok(content) = std::fs::read_to_string(recovery_log_path(plans_dir)) else {
        return Vec::new();
    };

    let mut entries = parse_entries(&content);
    if let Some(since_dt) = since {
        entries.retain(|e| e.timestamp >= since_dt);
    }
    if let Some(n) = limit {
        let skip = entries.len().saturating_sub(n);
        entries.drain(..skip);
    }
    entries.reverse();
    entries
}

fn parse_entries(content: &str) -> Vec<RecoveryEntry> {
    let mut entries = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let Some(header) = line.strip_prefix("## ") else {
            continue;
        };
        let Some((timestamp, category, description)) = parse_entry_header(header) else {
            continue;
        };

        let mut fields = Vec::new();
        let mut body_lines: Vec<&str> = Vec::new();
        let mut fence: Option<usize> = None;

        for line in lines.by_ref() {
            if let Some(run) = fence {
                if closes_fence(line, run) {
                    fence = None;
                } else {
                    body_lines.push(line);
                }
                continue;
            }
            if line == "---" || line.starts_with("## ") {
                break;
            }
            if let Some(run) = opening_fence(line) {
                fence = Some(run);
                continue;
            }
            if let Some((key, value)) = line.trim().split_once(": ") {
                fields.push((key.to_string(), value.to_string()));
            }
        }

        entries.push(RecoveryEntry {
            timestamp,
            category,
            description,
            fields,
            body: body_lines.join("\n"),
        });
    }

    entries
}

/// `<timestamp> - <category>: <description>`
fn parse_entry_header(header: &str) -> Option<(DateTime<Utc>, RecoveryCategory, String)> {
    let (timestamp_str, rest) = header.split_once(HEADER_SEPARATOR)?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp_str)
        .ok()?
        .with_timezone(&Utc);
    let (category_str, description) = rest.split_once(": ")?;
    let category = RecoveryCategory::parse_category(category_str)?;
    Some((timestamp, category, description.to_string()))
}

// ---------------------------------------------------------------------------
// Pruning
// ---------------------------------------------------------------------------

/// Prune entries older than `before` (default 30 days), or every entry
/// with `all`. Returns the number of entries removed.
pub fn prune_recovery(
    plans_dir: &Path,
    before: Option<DateTime<Utc>>,
    all: bool,
) -> io::Result<usize> {
    let path = recovery_log_path(plans_dir);
    if !path.exists() {
        return Ok(0);
    }
    let content = std::fs::read_to_string(&path)?;
    let original_count = parse_entries(&content).len();

    if all {
        atomic_write(&path, FILE_HEADER.as_bytes())?;
        return Ok(original_count);
    }

    let cutoff = before.unwrap_or_else(|| Utc::now() - chrono::Duration::days(PRUNE_AGE_DAYS));
    let trimmed = prune_entries_before(&content, &cutoff);
    let new_count = parse_entries(&trimmed).len();
    atomic_write(&path, trimmed.as_bytes())?;
    Ok(original_count - new_count)
}

/// Drop entries stamped before `cutoff`, keeping the file header.
fn prune_entries_before(content: &str, cutoff: &DateTime<Utc>) -> String {
    let mut result = String::new();
    let mut current_entry = String::new();
    let mut current_timestamp: Option<DateTime<Utc>> = None;
    let mut in_header = true;
    let mut fence: Option<usize> = None;

    let flush = |entry: &mut String, ts: Option<DateTime<Utc>>, result: &mut String| {
        if ts.is_some_and(|ts| ts >= *cutoff) {
            result.push_str(entry);
        }
        entry.clear();
    };

    for line in content.lines() {
        if in_header {
            result.push_str(line);
            result.push('\n');
            if line == "---" {
                in_header = false;
            }
            continue;
        }

        match fence {
            Some(run) => {
                if closes_fence(line, run) {
                    fence = None;
                }
            }
            None => {
                if let Some(stripped) = line.strip_prefix("## ") {
                    flush(&mut current_entry, current_timestamp, &mut result);
                    current_timestamp = parse_entry_header(stripped).map(|(ts, _, _)| ts);
                } else if let Some(run) = opening_fence(line) {
                    fence = Some(run);
                }
            }
        }
        current_entry.push_str(line);
        current_entry.push('\n');
    }
    flush(&mut current_entry, current_timestamp, &mut result);

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use tempfile::TempDir;

    fn entry_at(timestamp: DateTime<Utc>, desc: &str) -> RecoveryEntry {
        RecoveryEntry {
            timestamp,
            category: RecoveryCategory::Write,
            description: desc.to_string(),
            fields: vec![("Plan".to_string(), "calm-river-stone.md".to_string())],
            body: "# Plan\n\nbody".to_string(),
        }
    }

    #[test]
    fn test_entry_formatting() {
        let md = entry_at(Utc::now(), "write failed").to_markdown();
        assert!(md.contains("write: write failed"));
        assert!(md.contains("Plan: calm-river-stone.md"));
        assert!(md.contains("```text\n# Plan\n\nbody\n```"));
        assert!(md.ends_with("---\n"));
    }

    #[test]
    fn test_log_and_read_most_recent_first() {
        let tmp = TempDir::new().unwrap();
        log_failed_write(tmp.path(), "a.md", "disk full", "first");
        log_plan_deletion(tmp.path(), "b.md", "second");

        let entries = read_recovery_entries(tmp.path(), None, None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].category, RecoveryCategory::Delete);
        assert_eq!(entries[0].body, "second");
        assert_eq!(entries[1].fields[1], ("Error".to_string(), "disk full".to_string()));

        let limited = read_recovery_entries(tmp.path(), Some(1), None);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].description, "b.md deleted");
    }

    #[test]
    fn test_header_written_once() {
        let tmp = TempDir::new().unwrap();
        log_conflict(tmp.path(), "a.md", 10, "x");
        log_conflict(tmp.path(), "a.md", 11, "y");
        let content = std::fs::read_to_string(recovery_log_path(tmp.path())).unwrap();
        assert!(content.starts_with("<!-- planbook recovery log"));
        assert_eq!(content.matches("planbook recovery log").count(), 1);
    }

    #[test]
    fn test_prune_before_cutoff() {
        let tmp = TempDir::new().unwrap();
        log_recovery(tmp.path(), entry_at(Utc::now() - chrono::Duration::days(60), "old"));
        log_recovery(tmp.path(), entry_at(Utc::now(), "new"));

        let removed = prune_recovery(tmp.path(), None, false).unwrap();
        assert_eq!(removed, 1);
        let entries = read_recovery_entries(tmp.path(), None, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "new");
    }

    #[test]
    fn test_prune_keeps_sectioned_body_intact() {
        let tmp = TempDir::new().unwrap();
        let body = "# Plan\n\n## Steps\n- one\n\n## Risks\nnone";
        log_plan_deletion(tmp.path(), "a.md", body);

        let cutoff = Utc::now() - chrono::Duration::days(1);
        assert_eq!(prune_recovery(tmp.path(), Some(cutoff), false).unwrap(), 0);

        let entries = read_recovery_entries(tmp.path(), None, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].body, body);
    }

    #[test]
    fn test_prune_drops_whole_old_entry_with_header_like_body() {
        let now = Utc::now();
        let recent = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let mut old = entry_at(now - chrono::Duration::days(60), "old");
        old.body = format!("# Plan\n\n## {} - write: looks like a header\nleftover", recent);

        let content = format!(
            "{}{}{}",
            FILE_HEADER,
            old.to_markdown(),
            entry_at(now, "new").to_markdown()
        );
        let pruned = prune_entries_before(&content, &(now - chrono::Duration::days(30)));

        assert!(!pruned.contains("leftover"));
        let entries = parse_entries(&pruned);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "new");
    }

    #[test]
    fn test_body_with_code_blocks_round_trips() {
        let tmp = TempDir::new().unwrap();
        let body = "# Plan\n\n```rust\nfn main() {}\n```\n\nafter the block\n\n````\nfour\n````";
        log_failed_write(tmp.path(), "a.md", "disk full", body);
        log_plan_deletion(tmp.path(), "b.md", "second");

        let entries = read_recovery_entries(tmp.path(), None, None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].body, body);
        assert_eq!(entries[1].fields.len(), 2);
        assert_eq!(entries[0].body, "second");
    }

    #[test]
    fn test_fence_outgrows_body_backticks() {
        assert_eq!(fence_for("plain"), "```");
        assert_eq!(fence_for("```\ncode\n```"), "````");
        assert_eq!(fence_for("`````"), "``````");
    }

    #[test]
    fn test_prune_all_keeps_header() {
        let tmp = TempDir::new().unwrap();
        log_plan_deletion(tmp.path(), "a.md", "gone");
        assert_eq!(prune_recovery(tmp.path(), None, true).unwrap(), 1);
        assert!(read_recovery_entries(tmp.path(), None, None).is_empty());
        let content = std::fs::read_to_string(recovery_log_path(tmp.path())).unwrap();
        assert!(content.contains("planbook recovery log"));
    }

    #[test]
    fn test_parse_entry_header() {
        let (ts, cat, desc) =
            parse_entry_header("2026-02-10T14:32:05Z - delete: a.md deleted").unwrap();
        assert_eq!(ts.year(), 2026);
        assert_eq!(cat, RecoveryCategory::Delete);
        assert_eq!(desc, "a.md deleted");
        assert!(parse_entry_header("2026-02-10T14:32:05Z - parser: nope").is_none());
        assert!(parse_entry_header("not a header").is_none());
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.md");
        atomic_write(&path, b"hello").unwrap();
        atomic_write(&path, b"bye").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "bye");
    }

    #[test]
    fn test_entry_to_json() {
        let json = entry_at(Utc::now(), "x").to_json();
        assert_eq!(json["category"], "write");
        assert_eq!(json["fields"]["Plan"], "calm-river-stone.md");
    }
}
