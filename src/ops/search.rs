use std::ops::Range;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::model::plan::PlanDetail;
use crate::parse::query::{parse_query, ParsedQuery};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LINE_MATCHES: usize = 10;
/// Characters of context kept either side of a match
const HIGHLIGHT_CONTEXT: usize = 20;
const TITLE_WEIGHT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    /// 1-based line number within the plan body
    pub line: usize,
    pub content: String,
    pub highlight: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub filename: String,
    pub title: String,
    pub score: usize,
    pub matches: Vec<SearchMatch>,
}

/// Case-insensitive alternation of the literal terms.
fn term_matcher(terms: &[String]) -> Result<Regex, regex::Error> {
    let pattern = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}

fn highlight(line: &str, span: Range<usize>) -> String {
    let start = line[..span.start]
        .char_indices()
        .rev()
        .nth(HIGHLIGHT_CONTEXT - 1)
        .map_or(0, |(i, _)| i);
    let end = line[span.end..]
        .char_indices()
        .nth(HIGHLIGHT_CONTEXT)
        .map_or(line.len(), |(i, _)| span.end + i);

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(&line[start..end]);
    if end < line.len() {
        out.push_str("...");
    }
    out
}

fn line_matches(body: &str, re: &Regex) -> Vec<SearchMatch> {
    body.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let m = re.find(line)?;
            Some(SearchMatch {
                line: i + 1,
                content: line.trim().to_string(),
                highlight: highlight(line, m.range()),
            })
        })
        .collect()
}

fn passes_filters(parsed: &ParsedQuery, plan: &PlanDetail) -> bool {
    let fm = plan.meta.frontmatter.as_ref();
    parsed.filters.iter().all(|f| f.matches(fm))
}

/// Rank plans against a query. Filters must all hold; when the query has
/// text terms, a plan must also contain at least one of them.
pub fn search(plans: &[PlanDetail], query: &str, limit: usize) -> Vec<SearchResult> {
    if query.trim().is_empty() || limit == 0 {
        return Vec::new();
    }
    let parsed = parse_query(query);
    let matcher = if parsed.terms.is_empty() {
        None
    } else {
        match term_matcher(&parsed.terms) {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("search terms rejected: {}", e);
                return Vec::new();
            }
        }
    };

    let mut results: Vec<SearchResult> = plans
        .iter()
        .filter(|plan| passes_filters(&parsed, plan))
        .filter_map(|plan| {
            let Some(re) = &matcher else {
                return Some(SearchResult {
                    filename: plan.meta.filename.clone(),
                    title: plan.meta.title.clone(),
                    score: 0,
                    matches: Vec::new(),
                });
            };
            let title = plan.meta.title.to_lowercase();
            let title_hits = parsed.terms.iter().filter(|t| title.contains(t.as_str())).count();
            let mut matches = line_matches(&plan.content, re);
            if title_hits == 0 && matches.is_empty() {
                return None;
            }
            let score = title_hits * TITLE_WEIGHT + matches.len();
            matches.truncate(MAX_LINE_MATCHES);
            Some(SearchResult {
                filename: plan.meta.filename.clone(),
                title: plan.meta.title.clone(),
                score,
                matches,
            })
        })
        .collect();

    results.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.filename.cmp(&b.filename)));
    results.truncate(limit);
    log::debug!("search {:?}: {} results", query, results.len());
    results
}
