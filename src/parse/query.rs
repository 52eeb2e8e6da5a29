use crate::model::plan::{PlanFrontmatter, PlanStatus};

/// Frontmatter fields a query token can filter on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Status,
    Priority,
    Tag,
    Assignee,
    Due,
    Estimate,
    Project,
    BlockedBy,
}

impl FilterField {
    const ALL: [(FilterField, &'static str); 8] = [
        (FilterField::Status, "status"),
        (FilterField::Priority, "priority"),
        (FilterField::Tag, "tag"),
        (FilterField::Assignee, "assignee"),
        (FilterField::Due, "due"),
        (FilterField::Estimate, "estimate"),
        (FilterField::Project, "project"),
        (FilterField::BlockedBy, "blockedby"),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `key:value`, case-insensitive prefix
    Prefix,
    /// `key=value`, case-insensitive equality
    Exact,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    /// Longest operators first so `<=` is not read as `<`
    const SYMBOLS: [(&'static str, Operator); 6] = [
        ("<=", Operator::Le),
        (">=", Operator::Ge),
        ("<", Operator::Lt),
        (">", Operator::Gt),
        (":", Operator::Prefix),
        ("=", Operator::Exact),
    ];

    fn is_comparison(self) -> bool {
        matches!(self, Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: FilterField,
    pub op: Operator,
    /// Lowercased, quotes removed
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub filters: Vec<Filter>,
    /// Lowercased free-text terms; quoted phrases stay whole
    pub terms: Vec<String>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.terms.is_empty()
    }
}

/// Split on whitespace, keeping `"quoted phrases"` (or single-quoted) as
/// one token. Quote characters stay in the token.
pub fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in query.chars() {
        match quote {
            Some(q) if ch == q => {
                quote = None;
                current.push(ch);
            }
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            None if ch.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(ch),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn strip_quotes(s: &str) -> &str {
    let s = s.strip_prefix(['"', '\'']).unwrap_or(s);
    s.strip_suffix(['"', '\'']).unwrap_or(s)
}

fn parse_filter(token: &str) -> Option<Filter> {
    let lower = token.to_lowercase();
    for (field, name) in FilterField::ALL {
        let Some(rest) = lower.strip_prefix(name) else {
            continue;
        };
        for (symbol, op) in Operator::SYMBOLS {
            let Some(value) = rest.strip_prefix(symbol) else {
                continue;
            };
            let value = strip_quotes(value);
            if value.is_empty() || (op.is_comparison() && field != FilterField::Due) {
                return None;
            }
            return Some(Filter {
                field,
                op,
                value: value.to_lowercase(),
            });
        }
    }
    None
}

/// Parse a search string into filters and free-text terms. Tokens that
/// look like filters on unknown keys are kept as text.
pub fn parse_query(query: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();
    for token in tokenize(query) {
        if let Some(filter) = parse_filter(&token) {
            parsed.filters.push(filter);
            continue;
        }
        let term = strip_quotes(&token).trim().to_lowercase();
        if !term.is_empty() {
            parsed.terms.push(term);
        }
    }
    parsed
}

fn text_matches(op: Operator, actual: &str, wanted: &str) -> bool {
    let actual = actual.to_lowercase();
    match op {
        Operator::Exact => actual == wanted,
        _ => actual.starts_with(wanted),
    }
}

fn compare_dates(op: Operator, actual: &str, wanted: &str) -> bool {
    let a = actual.get(..10).unwrap_or(actual);
    let w = wanted.get(..10).unwrap_or(wanted);
    match op {
        Operator::Prefix => a.starts_with(w),
        Operator::Exact => a == w,
        Operator::Lt => a < w,
        Operator::Gt => a > w,
        Operator::Le => a <= w,
        Operator::Ge => a >= w,
    }
}

impl Filter {
    /// Plans without frontmatter never match. A plan with frontmatter but
    /// no status counts as `todo`.
    pub fn matches(&self, fm: Option<&PlanFrontmatter>) -> bool {
        let Some(fm) = fm else { return false };
        let one = |value: Option<&String>| value.is_some_and(|v| text_matches(self.op, v, &self.value));
        let any = |values: &[String]| values.iter().any(|v| text_matches(self.op, v, &self.value));

        match self.field {
            FilterField::Status => {
                let status = fm.status_or_default();
                let exact = PlanStatus::parse(&self.value) == Some(status);
                match self.op {
                    Operator::Exact => exact,
                    _ => exact || status.as_str().starts_with(&self.value),
                }
            }
            FilterField::Priority => fm
                .priority
                .is_some_and(|p| text_matches(self.op, p.as_str(), &self.value)),
            FilterField::Tag => any(&fm.tags),
            FilterField::Assignee => one(fm.assignee.as_ref()),
            FilterField::Due => fm
                .due_date
                .as_deref()
                .is_some_and(|d| compare_dates(self.op, d, &self.value)),
            FilterField::Estimate => one(fm.estimate.as_ref()),
            FilterField::Project => one(fm.project_path.as_ref()),
            FilterField::BlockedBy => any(&fm.blocked_by),
        }
    }
}
