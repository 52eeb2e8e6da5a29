use serde::{Deserialize, Serialize};

use super::plan::{PlanPriority, PlanStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Structured filter part of a saved view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PlanStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PlanPriority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Inclusive lower bound on `dueDate` (YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_after: Option<String>,
    /// Inclusive upper bound on `dueDate` (YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_before: Option<String>,
}

/// A named, reusable search configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedView {
    pub id: String,
    pub name: String,
    /// Free-text part of the search
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: ViewFilters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    pub created_at: String,
    #[serde(default)]
    pub is_preset: bool,
}

impl SavedView {
    /// Render the view as a search query string understood by the search
    /// service (filters first, then the free text).
    pub fn to_query(&self) -> String {
        let mut parts = Vec::new();
        if let Some(status) = self.filters.status {
            parts.push(format!("status={}", status));
        }
        if let Some(priority) = self.filters.priority {
            parts.push(format!("priority={}", priority));
        }
        for tag in &self.filters.tags {
            parts.push(format!("tag={}", quote_if_needed(tag)));
        }
        if let Some(assignee) = &self.filters.assignee {
            parts.push(format!("assignee:{}", quote_if_needed(assignee)));
        }
        if let Some(after) = &self.filters.due_after {
            parts.push(format!("due>={}", after));
        }
        if let Some(before) = &self.filters.due_before {
            parts.push(format!("due<={}", before));
        }
        let text = self.query.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
        parts.join(" ")
    }
}

fn quote_if_needed(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

/// Payload for creating a view
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateViewRequest {
    pub name: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: ViewFilters,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
}

/// Payload for updating a view; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateViewRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub filters: Option<ViewFilters>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(filters: ViewFilters, query: &str) -> SavedView {
        SavedView {
            id: "v".into(),
            name: "v".into(),
            query: query.into(),
            filters,
            sort_by: None,
            sort_order: None,
            created_at: "2026-01-01T00:00:00Z".into(),
            is_preset: false,
        }
    }

    #[test]
    fn to_query_orders_filters_before_text() {
        let v = view(
            ViewFilters {
                status: Some(PlanStatus::InProgress),
                tags: vec!["api".into(), "front end".into()],
                due_before: Some("2026-02-10".into()),
                ..Default::default()
            },
            " migration ",
        );
        assert_eq!(
            v.to_query(),
            "status=in_progress tag=api tag=\"front end\" due<=2026-02-10 migration"
        );
    }

    #[test]
    fn to_query_empty_view() {
        assert_eq!(view(ViewFilters::default(), "").to_query(), "");
    }
}
