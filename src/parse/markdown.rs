//! Extraction of listing metadata from a plan body.

pub const UNTITLED: &str = "Untitled";

/// `# Heading` (exactly one `#` followed by whitespace and text)
fn h1_text(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('#')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let text = rest.trim();
    if text.is_empty() { None } else { Some(text) }
}

fn h2_text(line: &str) -> Option<&str> {
    h1_text(line.strip_prefix('#')?)
}

/// First `# ` heading, or `Untitled`.
pub fn extract_title(body: &str) -> String {
    body.lines()
        .find_map(h1_text)
        .unwrap_or(UNTITLED)
        .to_string()
}

/// All `## ` headings in document order.
pub fn extract_sections(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(h2_text)
        .map(str::to_string)
        .collect()
}

/// Prose following the title, flattened to one line and cut to `length`
/// characters. Headings, tables, code fences and list items are skipped.
pub fn extract_preview(body: &str, length: usize) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let start = lines
        .iter()
        .position(|l| l.strip_prefix('#').is_some_and(|r| r.starts_with(char::is_whitespace)))
        .map_or(0, |i| i + 1);

    let text = lines[start..]
        .iter()
        .filter(|l| !l.starts_with(['#', '|', '`', '-', '*']))
        .flat_map(|l| l.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");

    if text.chars().count() > length {
        let cut: String = text.chars().take(length).collect();
        format!("{}...", cut)
    } else {
        text
    }
}

/// Markers that introduce a project path, tried in order. The bool marks
/// case-insensitive matching.
const PROJECT_MARKERS: &[(&str, bool)] = &[("プロジェクト", false), ("project", true), ("path", true)];

/// Value following `Project:` / `path:` (full-width colon accepted),
/// with surrounding backticks removed.
pub fn extract_related_project(body: &str) -> Option<String> {
    let folded = body.to_ascii_lowercase();
    for &(marker, fold) in PROJECT_MARKERS {
        let haystack = if fold { folded.as_str() } else { body };
        let mut from = 0;
        while let Some(pos) = haystack[from..].find(marker) {
            let after = from + pos + marker.len();
            from = after;
            if let Some(value) = project_value(&body[after..]) {
                return Some(value);
            }
        }
    }
    None
}

fn project_value(rest: &str) -> Option<String> {
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('：'))?;
    let rest = rest.trim_start_matches([' ', '\t', '\r']);
    let rest = rest.strip_prefix('`').unwrap_or(rest);
    let end = rest.find(['\n', '`']).unwrap_or(rest.len());
    let value = rest[..end].trim();
    if value.is_empty() { None } else { Some(value.to_string()) }
}

/// Targets of `[[name]]` references, normalised to filenames and
/// deduplicated in first-seen order. `[[name|label]]` and `[[name#heading]]`
/// resolve to `name`.
pub fn extract_wikilinks(body: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    let mut rest = body;
    while let Some(open) = rest.find("[[") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("]]") else { break };
        let inner = &after[..close];
        rest = &after[close + 2..];

        if inner.contains('\n') {
            continue;
        }
        let name = inner
            .split(['|', '#'])
            .next()
            .unwrap_or_default()
            .trim();
        if name.is_empty() {
            continue;
        }
        let filename = if name.ends_with(".md") {
            name.to_string()
        } else {
            format!("{}.md", name)
        };
        if !links.contains(&filename) {
            links.push(filename);
        }
    }
    links
}
