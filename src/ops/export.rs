//! Whole-library exports: a JSON document, a CSV of metadata, or a gzipped
//! tarball of the markdown files.

use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::model::plan::{PlanFrontmatter, PlanStatus};
use crate::parse::{extract_title, parse_document};

/// Version of the JSON export layout
pub const EXPORT_VERSION: u32 = 1;

pub const CSV_HEADER: &str = "filename,title,status,dueDate,estimate,created,modified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    /// gzipped tar of the plan files
    Tar,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<ExportFormat> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            "tar" | "tar.gz" | "tgz" | "zip" => Some(ExportFormat::Tar),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json; charset=utf-8",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Tar => "application/gzip",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ExportFormat::Json => "plans-export.json",
            ExportFormat::Csv => "plans-export.csv",
            ExportFormat::Tar => "plans-export.tar.gz",
        }
    }
}

/// Which plans an export covers
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    #[serde(default)]
    pub include_archived: bool,
    #[serde(default)]
    pub filter_status: Option<PlanStatus>,
    /// A plan must carry every one of these tags (case-insensitive)
    #[serde(default)]
    pub filter_tags: Vec<String>,
}

impl ExportOptions {
    pub fn matches(&self, frontmatter: Option<&PlanFrontmatter>) -> bool {
        if let Some(status) = self.filter_status {
            let actual = frontmatter.map(PlanFrontmatter::status_or_default).unwrap_or_default();
            if actual != status {
                return false;
            }
        }
        self.filter_tags.iter().all(|wanted| {
            frontmatter.is_some_and(|fm| fm.tags.iter().any(|t| t.eq_ignore_ascii_case(wanted)))
        })
    }
}

/// One plan file as exported: the raw file content plus its parsed
/// frontmatter.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub filename: String,
    pub content: String,
    pub archived: bool,
}

impl ExportPlan {
    pub fn frontmatter(&self) -> Option<PlanFrontmatter> {
        parse_document(&self.content).frontmatter
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    exported_at: String,
    version: u32,
    plan_count: usize,
    plans: Vec<JsonPlan<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonPlan<'a> {
    filename: &'a str,
    frontmatter: PlanFrontmatter,
    content: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    archived: bool,
}

/// Keep only the plans `options` selects.
pub fn select(plans: Vec<ExportPlan>, options: &ExportOptions) -> Vec<ExportPlan> {
    plans
        .into_iter()
        .filter(|p| options.include_archived || !p.archived)
        .filter(|p| options.matches(p.frontmatter().as_ref()))
        .collect()
}

/// Pretty-printed JSON document of every plan.
pub fn to_json(plans: &[ExportPlan], now: DateTime<Utc>) -> Result<String, serde_json::Error> {
    let export = JsonExport {
        exported_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        version: EXPORT_VERSION,
        plan_count: plans.len(),
        plans: plans
            .iter()
            .map(|p| JsonPlan {
                filename: &p.filename,
                frontmatter: p.frontmatter().unwrap_or_default(),
                content: &p.content,
                archived: p.archived,
            })
            .collect(),
    };
    serde_json::to_string_pretty(&export)
}

/// One metadata row per plan under [`CSV_HEADER`]. No trailing newline.
pub fn to_csv(plans: &[ExportPlan]) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for plan in plans {
        let doc = parse_document(&plan.content);
        let fm = doc.frontmatter.unwrap_or_default();
        let status = fm.status.map(|s| s.as_str().to_string());
        let row = [
            Some(plan.filename.clone()),
            Some(extract_title(doc.body)),
            status,
            fm.due_date,
            fm.estimate,
            fm.created,
            fm.modified,
        ];
        let cells: Vec<String> = row.iter().map(|v| csv_cell(v.as_deref())).collect();
        lines.push(cells.join(","));
    }
    lines.join("\n")
}

fn csv_cell(value: Option<&str>) -> String {
    match value {
        None | Some("") => String::new(),
        Some(v) if v.contains([',', '"', '\n', '\r']) => format!("\"{}\"", v.replace('"', "\"\"")),
        Some(v) => v.to_string(),
    }
}

/// Gzipped tar holding each plan file. Archived plans go under `archive/`.
pub fn to_tar_gz(plans: &[ExportPlan], now: DateTime<Utc>) -> std::io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mtime = now.timestamp().max(0) as u64;

    for plan in plans {
        let bytes = plan.content.as_bytes();
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        let path = if plan.archived {
            format!("archive/{}", plan.filename)
        } else {
            plan.filename.clone()
        };
        builder.append_data(&mut header, path, bytes)?;
    }

    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    encoder.finish()
}
