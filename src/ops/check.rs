use std::collections::HashSet;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::model::plan::{PlanPriority, PlanStatus, SubtaskStatus};
use crate::parse::frontmatter::{needs_migration, parse_document, split_frontmatter};
use crate::parse::markdown::{extract_title, extract_wikilinks, UNTITLED};

/// Structured result from `pb check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub checked: usize,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// A validation error (something that should be fixed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// The frontmatter block is not valid YAML
    #[serde(rename = "malformed_frontmatter")]
    MalformedFrontmatter { filename: String, message: String },
    #[serde(rename = "invalid_status")]
    InvalidStatus { filename: String, value: String },
    #[serde(rename = "invalid_priority")]
    InvalidPriority { filename: String, value: String },
    /// `dueDate` is neither `YYYY-MM-DD` nor an RFC 3339 timestamp
    #[serde(rename = "invalid_due_date")]
    InvalidDueDate { filename: String, value: String },
    /// `estimate` does not look like `3d`, `4h`, `2w`, `1m`
    #[serde(rename = "invalid_estimate")]
    InvalidEstimate { filename: String, value: String },
    /// A `blockedBy` entry names a plan that does not exist
    #[serde(rename = "dangling_blocked_by")]
    DanglingBlockedBy { filename: String, target: String },
    /// A subtask lacks an id or title (it is dropped on read)
    #[serde(rename = "invalid_subtask")]
    InvalidSubtask { filename: String, index: usize },
}

/// A validation warning (non-critical issue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    /// A `[[link]]` in the body points at no plan
    #[serde(rename = "unresolved_link")]
    UnresolvedLink { filename: String, target: String },
    /// Status is understood but not in canonical form
    #[serde(rename = "legacy_status")]
    LegacyStatus {
        filename: String,
        value: String,
        canonical: String,
    },
    #[serde(rename = "missing_title")]
    MissingTitle { filename: String },
    /// Frontmatter predates the current schema version (`pb migrate`)
    #[serde(rename = "outdated_schema")]
    OutdatedSchema { filename: String },
}

/// A plan as read from disk, before any lenient parsing
#[derive(Debug, Clone)]
pub struct RawPlan {
    pub filename: String,
    pub content: String,
}

pub fn is_valid_estimate(s: &str) -> bool {
    let Some(unit) = s.chars().last() else {
        return false;
    };
    let digits = &s[..s.len() - unit.len_utf8()];
    matches!(unit, 'h' | 'd' | 'w' | 'm')
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
}

pub fn is_valid_date(s: &str) -> bool {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || chrono::DateTime::parse_from_rfc3339(s).is_ok()
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn normalize(target: &str) -> String {
    let target = target.trim();
    if target.ends_with(".md") {
        target.to_string()
    } else {
        format!("{}.md", target)
    }
}

/// Validate every plan and return structured results.
///
/// Read-only: nothing is corrected on disk.
pub fn check_plans(plans: &[RawPlan]) -> CheckResult {
    let known: HashSet<&str> = plans.iter().map(|p| p.filename.as_str()).collect();
    let mut result = CheckResult {
        checked: plans.len(),
        ..Default::default()
    };

    for plan in plans {
        check_plan(plan, &known, &mut result);
    }

    result.valid = result.errors.is_empty();
    result
}

fn check_plan(plan: &RawPlan, known: &HashSet<&str>, result: &mut CheckResult) {
    let filename = plan.filename.as_str();
    let doc = parse_document(&plan.content);

    if extract_title(doc.body) == UNTITLED {
        result.warnings.push(CheckWarning::MissingTitle {
            filename: filename.to_string(),
        });
    }
    for target in extract_wikilinks(doc.body) {
        if !known.contains(target.as_str()) {
            result.warnings.push(CheckWarning::UnresolvedLink {
                filename: filename.to_string(),
                target,
            });
        }
    }

    let Some((yaml, _)) = split_frontmatter(&plan.content) else {
        return;
    };
    if yaml.trim().is_empty() {
        return;
    }
    let map: Mapping = match serde_yaml::from_str(yaml) {
        Ok(map) => map,
        Err(e) => {
            result.errors.push(CheckError::MalformedFrontmatter {
                filename: filename.to_string(),
                message: e.to_string(),
            });
            return;
        }
    };
    check_frontmatter(filename, &map, known, result);

    if doc.frontmatter.is_some() && needs_migration(doc.frontmatter.as_ref()) {
        result.warnings.push(CheckWarning::OutdatedSchema {
            filename: filename.to_string(),
        });
    }
}

fn check_frontmatter(filename: &str, map: &Mapping, known: &HashSet<&str>, result: &mut CheckResult) {
    let owned = || filename.to_string();

    if let Some(value) = map.get("status") {
        let raw = scalar(value);
        match PlanStatus::parse(&raw) {
            None => result.errors.push(CheckError::InvalidStatus {
                filename: owned(),
                value: raw,
            }),
            Some(status) if status.as_str() != raw => result.warnings.push(CheckWarning::LegacyStatus {
                filename: owned(),
                value: raw,
                canonical: status.as_str().to_string(),
            }),
            Some(_) => {}
        }
    }

    if let Some(value) = map.get("priority") {
        let raw = scalar(value);
        if PlanPriority::parse(&raw).is_none() {
            result.errors.push(CheckError::InvalidPriority {
                filename: owned(),
                value: raw,
            });
        }
    }

    if let Some(value) = map.get("dueDate") {
        let raw = scalar(value);
        if !is_valid_date(&raw) {
            result.errors.push(CheckError::InvalidDueDate {
                filename: owned(),
                value: raw,
            });
        }
    }

    if let Some(value) = map.get("estimate") {
        let raw = scalar(value);
        if !is_valid_estimate(&raw) {
            result.errors.push(CheckError::InvalidEstimate {
                filename: owned(),
                value: raw,
            });
        }
    }

    let blocked_by: Vec<String> = match map.get("blockedBy") {
        Some(Value::Sequence(items)) => items.iter().map(scalar).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![scalar(other)],
    };
    for target in blocked_by.iter().filter(|t| !t.trim().is_empty()) {
        let target = normalize(target);
        if !known.contains(target.as_str()) {
            result.errors.push(CheckError::DanglingBlockedBy {
                filename: owned(),
                target,
            });
        }
    }

    if let Some(Value::Sequence(items)) = map.get("subtasks") {
        for (index, item) in items.iter().enumerate() {
            let field = |key: &str| item.get(key).map(scalar).filter(|s| !s.trim().is_empty());
            let status_ok = field("status").is_none_or(|s| SubtaskStatus::parse(&s).is_some());
            if field("id").is_none() || field("title").is_none() || !status_ok {
                result.errors.push(CheckError::InvalidSubtask {
                    filename: owned(),
                    index,
                });
            }
        }
    }
}
