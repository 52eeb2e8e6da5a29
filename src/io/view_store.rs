use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use crate::io::error::StoreError;
use crate::io::{read_json_or_default, write_json};
use crate::model::plan::{PlanPriority, PlanStatus};
use crate::model::view::{CreateViewRequest, SavedView, UpdateViewRequest, ViewFilters};

pub const VIEWS_FILENAME: &str = ".views.json";

/// Built-in views, always listed first and never written to disk.
pub fn preset_views() -> Vec<SavedView> {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let preset = |id: &str, name: &str, filters: ViewFilters| SavedView {
        id: id.to_string(),
        name: name.to_string(),
        query: String::new(),
        filters,
        sort_by: None,
        sort_order: None,
        created_at: now.clone(),
        is_preset: true,
    };
    vec![
        preset(
            "preset-in-progress",
            "In Progress",
            ViewFilters {
                status: Some(PlanStatus::InProgress),
                ..Default::default()
            },
        ),
        preset(
            "preset-high-priority",
            "High Priority",
            ViewFilters {
                priority: Some(PlanPriority::High),
                ..Default::default()
            },
        ),
        preset(
            "preset-critical",
            "Critical",
            ViewFilters {
                priority: Some(PlanPriority::Critical),
                ..Default::default()
            },
        ),
        preset(
            "preset-todo",
            "Todo",
            ViewFilters {
                status: Some(PlanStatus::Todo),
                ..Default::default()
            },
        ),
    ]
}

fn is_preset_id(id: &str) -> bool {
    id.starts_with("preset-")
}

/// Custom views in `<plans_dir>/.views.json`
#[derive(Debug, Clone)]
pub struct ViewStore {
    path: PathBuf,
}

impl ViewStore {
    pub fn new(plans_dir: &Path) -> Self {
        ViewStore {
            path: plans_dir.join(VIEWS_FILENAME),
        }
    }

    fn read_custom(&self) -> Vec<SavedView> {
        read_json_or_default(&self.path)
    }

    fn write_custom(&self, views: &[SavedView]) -> Result<(), StoreError> {
        write_json(&self.path, &views)
    }

    /// Presets followed by custom views in creation order.
    pub fn list(&self) -> Vec<SavedView> {
        let mut views = preset_views();
        views.extend(self.read_custom());
        views
    }

    pub fn get(&self, id: &str) -> Result<SavedView, StoreError> {
        self.list()
            .into_iter()
            .find(|v| v.id == id)
            .ok_or_else(|| StoreError::ViewNotFound(id.to_string()))
    }

    pub fn create(&self, request: CreateViewRequest) -> Result<SavedView, StoreError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("view name must not be empty".to_string()));
        }
        let view = SavedView {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            query: request.query,
            filters: request.filters,
            sort_by: request.sort_by,
            sort_order: request.sort_order,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            is_preset: false,
        };
        let mut views = self.read_custom();
        views.push(view.clone());
        self.write_custom(&views)?;
        log::info!("created view {} ({})", view.name, view.id);
        Ok(view)
    }

    pub fn update(&self, id: &str, update: UpdateViewRequest) -> Result<SavedView, StoreError> {
        if is_preset_id(id) {
            return Err(StoreError::PresetView(id.to_string()));
        }
        let mut views = self.read_custom();
        let view = views
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| StoreError::ViewNotFound(id.to_string()))?;

        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(StoreError::Invalid("view name must not be empty".to_string()));
            }
            view.name = name.to_string();
        }
        if let Some(query) = update.query {
            view.query = query;
        }
        if let Some(filters) = update.filters {
            view.filters = filters;
        }
        if update.sort_by.is_some() {
            view.sort_by = update.sort_by;
        }
        if update.sort_order.is_some() {
            view.sort_order = update.sort_order;
        }
        let updated = view.clone();
        self.write_custom(&views)?;
        log::info!("updated view {}", id);
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        if is_preset_id(id) {
            return Err(StoreError::PresetView(id.to_string()));
        }
        let mut views = self.read_custom();
        let before = views.len();
        views.retain(|v| v.id != id);
        if views.len() == before {
            return Err(StoreError::ViewNotFound(id.to_string()));
        }
        self.write_custom(&views)?;
        log::info!("deleted view {}", id);
        Ok(())
    }
}
