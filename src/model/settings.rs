use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Keyboard shortcut actions and their default chords, in display order.
pub const DEFAULT_SHORTCUTS: &[(&str, &str)] = &[
    ("openCommandPalette", "Mod+K"),
    ("openQuickOpen", "Mod+P"),
    ("commandGoHome", "Mod+1"),
    ("commandGoSearch", "Mod+2"),
    ("commandOpenSettings", "Mod+,"),
    ("commandToggleTheme", "Mod+Shift+T"),
    ("commandOpenQuickOpen", "Mod+Shift+P"),
    ("commandOpenCurrentReview", "Mod+Shift+R"),
];

/// User preferences persisted in `.settings.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Enables status, priority, tags, subtasks and everything else that
    /// lives in frontmatter
    #[serde(default = "default_true")]
    pub frontmatter_enabled: bool,
    /// Directories scanned for plans. Empty means the configured plans dir.
    #[serde(default)]
    pub plan_directories: Vec<String>,
    #[serde(default = "default_shortcuts")]
    pub shortcuts: IndexMap<String, String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            frontmatter_enabled: true,
            plan_directories: Vec::new(),
            shortcuts: default_shortcuts(),
        }
    }
}

fn default_true() -> bool {
    true
}

pub fn default_shortcuts() -> IndexMap<String, String> {
    DEFAULT_SHORTCUTS
        .iter()
        .map(|(action, chord)| (action.to_string(), chord.to_string()))
        .collect()
}

/// Overlay user-provided chords on the defaults. Unknown actions and blank
/// chords are ignored.
pub fn merge_shortcuts(overrides: &IndexMap<String, String>) -> IndexMap<String, String> {
    let mut merged = default_shortcuts();
    for (action, chord) in overrides {
        if let Some(slot) = merged.get_mut(action)
            && !chord.trim().is_empty()
        {
            *slot = chord.clone();
        }
    }
    merged
}

/// Partial settings update. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontmatter_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_directories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcuts: Option<IndexMap<String, String>>,
}

impl AppSettings {
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(enabled) = update.frontmatter_enabled {
            self.frontmatter_enabled = enabled;
        }
        if let Some(dirs) = update.plan_directories {
            self.plan_directories = dirs
                .into_iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }
        if let Some(shortcuts) = update.shortcuts {
            let mut combined = self.shortcuts.clone();
            combined.extend(shortcuts);
            self.shortcuts = merge_shortcuts(&combined);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_object() {
        let settings: AppSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.frontmatter_enabled);
        assert!(settings.plan_directories.is_empty());
        assert_eq!(settings.shortcuts["openQuickOpen"], "Mod+P");
    }

    #[test]
    fn merge_ignores_unknown_and_blank() {
        let mut overrides = IndexMap::new();
        overrides.insert("openQuickOpen".to_string(), "Mod+O".to_string());
        overrides.insert("commandGoHome".to_string(), "  ".to_string());
        overrides.insert("launchRockets".to_string(), "Mod+L".to_string());
        let merged = merge_shortcuts(&overrides);
        assert_eq!(merged["openQuickOpen"], "Mod+O");
        assert_eq!(merged["commandGoHome"], "Mod+1");
        assert!(!merged.contains_key("launchRockets"));
        assert_eq!(merged.len(), DEFAULT_SHORTCUTS.len());
    }

    #[test]
    fn update_rejects_unknown_keys() {
        let err = serde_json::from_str::<SettingsUpdate>(r#"{"theme":"dark"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn apply_drops_blank_directories() {
        let mut settings = AppSettings::default();
        settings.apply(SettingsUpdate {
            plan_directories: Some(vec![" /a ".into(), "".into()]),
            ..Default::default()
        });
        assert_eq!(settings.plan_directories, vec!["/a".to_string()]);
    }
}
