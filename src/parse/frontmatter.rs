use serde_yaml::{Mapping, Value};

use crate::model::plan::{PlanFrontmatter, PlanPriority, PlanStatus, Subtask, SubtaskStatus};

/// Frontmatter layout version written by this crate
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Keys accepted by [`set_field`], in their on-disk (camelCase) spelling
pub const EDITABLE_FIELDS: &[&str] = &[
    "created",
    "modified",
    "projectPath",
    "sessionId",
    "status",
    "priority",
    "dueDate",
    "tags",
    "estimate",
    "blockedBy",
    "assignee",
    "archivedAt",
    "subtasks",
    "schemaVersion",
];

/// A plan file split into its parts
#[derive(Debug, Clone, PartialEq)]
pub struct Document<'a> {
    /// `None` when the file has no frontmatter block or the block holds no
    /// recognised keys
    pub frontmatter: Option<PlanFrontmatter>,
    pub body: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("unknown frontmatter field: {0}")]
    UnknownField(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Split `---\n<yaml>\n---\n<body>` into its yaml and body halves.
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---\n")?;
    // An empty block leaves the closing fence right at the start
    if let Some(body) = rest.strip_prefix("---\n") {
        return Some(("", body));
    }
    let end = rest.find("\n---\n")?;
    Some((&rest[..end], &rest[end + 5..]))
}

/// Parse a plan file into frontmatter and body.
pub fn parse_document(content: &str) -> Document<'_> {
    let Some((yaml, body)) = split_frontmatter(content) else {
        return Document {
            frontmatter: None,
            body: content,
        };
    };

    let mapping = match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(m)) => m,
        Ok(_) => Mapping::new(),
        Err(e) => {
            log::warn!("frontmatter is not valid YAML, reading top-level keys only: {}", e);
            scan_top_level(yaml)
        }
    };

    let fm = from_mapping(&mapping);
    Document {
        frontmatter: if fm.is_empty() { None } else { Some(fm) },
        body,
    }
}

/// Best-effort `key: value` scan used when the YAML parser gives up
fn scan_top_level(yaml: &str) -> Mapping {
    let mut map = Mapping::new();
    for line in yaml.lines() {
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = unquote(value.trim());
        if value.is_empty() {
            continue;
        }
        map.insert(
            Value::String(key.trim().to_string()),
            Value::String(value.to_string()),
        );
    }
    map
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn scalar(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Tagged(t) => return scalar(&t.value),
        _ => return None,
    };
    if s.is_empty() { None } else { Some(s) }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar).collect(),
        // A lone scalar is a one-element list
        other => scalar(other).into_iter().collect(),
    }
}

fn subtask_list(value: &Value) -> Vec<Subtask> {
    let Value::Sequence(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let map = item.as_mapping()?;
            let get = |k: &str| map.get(k).and_then(scalar);
            Some(Subtask {
                id: get("id")?,
                title: get("title")?,
                status: get("status")
                    .and_then(|s| SubtaskStatus::parse(&s))
                    .unwrap_or_default(),
                assignee: get("assignee"),
                due_date: get("dueDate"),
            })
        })
        .collect()
}

/// Pull the known keys out of a YAML mapping. Values that cannot be
/// understood are dropped rather than failing the whole block.
fn from_mapping(map: &Mapping) -> PlanFrontmatter {
    let mut fm = PlanFrontmatter::default();
    for (key, value) in map {
        let Some(key) = key.as_str() else { continue };
        match key {
            "created" => fm.created = scalar(value),
            "modified" => fm.modified = scalar(value),
            "project_path" | "projectPath" => fm.project_path = scalar(value),
            "session_id" | "sessionId" => fm.session_id = scalar(value),
            "status" => fm.status = scalar(value).and_then(|s| PlanStatus::parse(&s)),
            "priority" => fm.priority = scalar(value).and_then(|s| PlanPriority::parse(&s)),
            "dueDate" => fm.due_date = scalar(value),
            "tags" => fm.tags = string_list(value),
            "estimate" => fm.estimate = scalar(value),
            "blockedBy" => fm.blocked_by = string_list(value),
            "assignee" => fm.assignee = scalar(value),
            "archivedAt" => fm.archived_at = scalar(value),
            "subtasks" => fm.subtasks = subtask_list(value),
            "schemaVersion" => {
                fm.schema_version = scalar(value).and_then(|s| s.parse().ok());
            }
            _ => {}
        }
    }
    fm
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Serialize frontmatter in the fixed key order plans are written with.
pub fn serialize_frontmatter(fm: &PlanFrontmatter) -> String {
    let mut lines = Vec::new();
    push_string("created", &fm.created, &mut lines);
    push_string("modified", &fm.modified, &mut lines);
    push_string("project_path", &fm.project_path, &mut lines);
    push_string("session_id", &fm.session_id, &mut lines);
    if let Some(status) = fm.status {
        lines.push(format!("status: {}", status));
    }
    if let Some(priority) = fm.priority {
        lines.push(format!("priority: {}", priority));
    }
    push_string("dueDate", &fm.due_date, &mut lines);
    push_list(&mut lines, "tags", &fm.tags);
    push_string("estimate", &fm.estimate, &mut lines);
    push_list(&mut lines, "blockedBy", &fm.blocked_by);
    push_string("assignee", &fm.assignee, &mut lines);
    push_string("archivedAt", &fm.archived_at, &mut lines);
    if !fm.subtasks.is_empty() {
        lines.push("subtasks:".to_string());
        for st in &fm.subtasks {
            lines.push(format!("  - id: {}", quoted(&st.id)));
            lines.push(format!("    title: {}", quoted(&st.title)));
            lines.push(format!("    status: {}", st.status.as_str()));
            if let Some(a) = &st.assignee {
                lines.push(format!("    assignee: {}", quoted(a)));
            }
            if let Some(d) = &st.due_date {
                lines.push(format!("    dueDate: {}", quoted(d)));
            }
        }
    }
    if let Some(v) = fm.schema_version {
        lines.push(format!("schemaVersion: {}", v));
    }
    lines.join("\n")
}

fn push_string(key: &str, value: &Option<String>, lines: &mut Vec<String>) {
    if let Some(v) = value {
        lines.push(format!("{}: {}", key, quoted(v)));
    }
}

fn push_list(lines: &mut Vec<String>, key: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(format!("{}:", key));
    for item in items {
        lines.push(format!("  - {}", quoted(item)));
    }
}

/// Reassemble a plan file. An empty frontmatter drops the block entirely.
pub fn compose(fm: &PlanFrontmatter, body: &str) -> String {
    if fm.is_empty() {
        return body.to_string();
    }
    format!("---\n{}\n---\n{}", serialize_frontmatter(fm), body)
}

pub fn needs_migration(fm: Option<&PlanFrontmatter>) -> bool {
    fm.and_then(|f| f.schema_version).unwrap_or(0) < CURRENT_SCHEMA_VERSION
}

/// Bring frontmatter up to the current schema version. Version 0 had no
/// `schemaVersion` key and allowed scalar `tags`, which the reader already
/// folds into a list, so the upgrade only stamps the version.
pub fn migrate(mut fm: PlanFrontmatter) -> PlanFrontmatter {
    if fm.schema_version.unwrap_or(0) < CURRENT_SCHEMA_VERSION {
        fm.schema_version = Some(CURRENT_SCHEMA_VERSION);
    }
    fm
}

/// Set (or with `null`, clear) one field from a JSON value.
pub fn set_field(
    fm: &mut PlanFrontmatter,
    field: &str,
    value: serde_json::Value,
) -> Result<(), FieldError> {
    let key = match field {
        "project_path" => "projectPath",
        "session_id" => "sessionId",
        other => other,
    };
    if !EDITABLE_FIELDS.contains(&key) {
        return Err(FieldError::UnknownField(field.to_string()));
    }

    let invalid = |message: String| FieldError::InvalidValue {
        field: field.to_string(),
        message,
    };

    // Accept legacy status spellings the same way the reader does
    let value = match (key, value) {
        ("status", serde_json::Value::String(s)) => {
            let status = PlanStatus::parse(&s)
                .ok_or_else(|| invalid(format!("unknown status '{}'", s)))?;
            serde_json::Value::String(status.as_str().to_string())
        }
        (_, v) => v,
    };

    let mut object = match serde_json::to_value(&*fm) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => serde_json::Map::new(),
        Err(e) => return Err(invalid(e.to_string())),
    };
    if value.is_null() {
        object.remove(key);
    } else {
        object.insert(key.to_string(), value);
    }
    *fm = serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| invalid(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "---\ncreated: \"2026-01-05T10:00:00Z\"\nstatus: in-progress\npriority: urgent\ndueDate: 2026-02-01\ntags:\n  - \"api\"\n  - backend\nblockedBy: [base-plan.md]\nsubtasks:\n  - id: \"st-1\"\n    title: \"Write tests\"\n    status: done\n  - title: \"no id, dropped\"\nschemaVersion: 1\nextra: ignored\n---\n# Title\n\nBody\n";

    #[test]
    fn parses_known_keys_and_drops_bad_values() {
        let doc = parse_document(SAMPLE);
        let fm = doc.frontmatter.unwrap();
        assert_eq!(fm.created.as_deref(), Some("2026-01-05T10:00:00Z"));
        assert_eq!(fm.status, Some(PlanStatus::InProgress));
        assert_eq!(fm.priority, None);
        assert_eq!(fm.due_date.as_deref(), Some("2026-02-01"));
        assert_eq!(fm.tags, vec!["api", "backend"]);
        assert_eq!(fm.blocked_by, vec!["base-plan.md"]);
        assert_eq!(fm.subtasks.len(), 1);
        assert_eq!(fm.subtasks[0].status, SubtaskStatus::Done);
        assert_eq!(fm.schema_version, Some(1));
        assert_eq!(doc.body, "# Title\n\nBody\n");
    }

    #[test]
    fn no_block_means_whole_file_is_body() {
        let doc = parse_document("# Just markdown\n");
        assert!(doc.frontmatter.is_none());
        assert_eq!(doc.body, "# Just markdown\n");
    }

    #[test]
    fn unterminated_block_is_body() {
        let content = "---\nstatus: todo\n# never closed\n";
        assert!(split_frontmatter(content).is_none());
    }

    #[test]
    fn empty_block_splits() {
        assert_eq!(split_frontmatter("---\n---\nbody"), Some(("", "body")));
        assert!(parse_document("---\n---\nbody").frontmatter.is_none());
    }

    #[test]
    fn broken_yaml_falls_back_to_line_scan() {
        let doc = parse_document("---\nstatus: review\nassignee: 'sam\n  : [\n---\nbody");
        let fm = doc.frontmatter.unwrap();
        assert_eq!(fm.status, Some(PlanStatus::Review));
        assert_eq!(doc.body, "body");
    }

    #[test]
    fn scalar_tags_become_a_list() {
        let doc = parse_document("---\ntags: solo\n---\n");
        assert_eq!(doc.frontmatter.unwrap().tags, vec!["solo"]);
    }

    #[test]
    fn serializer_layout() {
        let fm = PlanFrontmatter {
            created: Some("2026-01-05".into()),
            status: Some(PlanStatus::Review),
            priority: Some(PlanPriority::High),
            tags: vec!["a \"quoted\" tag".into()],
            subtasks: vec![Subtask {
                id: "st-1".into(),
                title: "Ship".into(),
                status: SubtaskStatus::Todo,
                assignee: Some("kim".into()),
                due_date: None,
            }],
            schema_version: Some(1),
            ..Default::default()
        };
        insta::assert_snapshot!(serialize_frontmatter(&fm), @r#"
        created: "2026-01-05"
        status: review
        priority: high
        tags:
          - "a \"quoted\" tag"
        subtasks:
          - id: "st-1"
            title: "Ship"
            status: todo
            assignee: "kim"
        schemaVersion: 1
        "#);
    }

    #[test]
    fn compose_then_parse_keeps_fields() {
        let fm = PlanFrontmatter {
            status: Some(PlanStatus::Completed),
            blocked_by: vec!["x.md".into()],
            assignee: Some("back\\slash".into()),
            ..Default::default()
        };
        let content = compose(&fm, "# T\n");
        let doc = parse_document(&content);
        assert_eq!(doc.frontmatter, Some(fm));
        assert_eq!(doc.body, "# T\n");
    }

    #[test]
    fn compose_empty_frontmatter_is_body_only() {
        assert_eq!(compose(&PlanFrontmatter::default(), "# T\n"), "# T\n");
    }

    #[test]
    fn migrate_stamps_version() {
        assert!(needs_migration(None));
        let fm = migrate(PlanFrontmatter::default());
        assert_eq!(fm.schema_version, Some(CURRENT_SCHEMA_VERSION));
        assert!(!needs_migration(Some(&fm)));
    }

    #[test]
    fn set_field_validates() {
        let mut fm = PlanFrontmatter::default();
        set_field(&mut fm, "priority", serde_json::json!("critical")).unwrap();
        assert_eq!(fm.priority, Some(PlanPriority::Critical));
        set_field(&mut fm, "status", serde_json::json!("done")).unwrap();
        assert_eq!(fm.status, Some(PlanStatus::Completed));
        set_field(&mut fm, "tags", serde_json::json!(["x", "y"])).unwrap();
        assert_eq!(fm.tags, vec!["x", "y"]);
        set_field(&mut fm, "priority", serde_json::Value::Null).unwrap();
        assert_eq!(fm.priority, None);

        assert!(matches!(
            set_field(&mut fm, "colour", serde_json::json!("red")),
            Err(FieldError::UnknownField(_))
        ));
        assert!(matches!(
            set_field(&mut fm, "priority", serde_json::json!("urgent")),
            Err(FieldError::InvalidValue { .. })
        ));
        // Failed updates leave the value untouched
        assert_eq!(fm.tags, vec!["x", "y"]);
    }
}
