use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::io::error::StoreError;
use crate::io::{read_json_or_default, write_json};
use crate::model::settings::{merge_shortcuts, AppSettings, SettingsUpdate};

pub const SETTINGS_FILENAME: &str = ".settings.json";

/// `.settings.json` in the plans directory, cached after the first read.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    cache: Mutex<Option<AppSettings>>,
}

impl SettingsStore {
    pub fn new(plans_dir: &Path) -> Self {
        SettingsStore {
            path: plans_dir.join(SETTINGS_FILENAME),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings. A missing or unreadable file yields the defaults.
    pub fn get(&self) -> AppSettings {
        if let Ok(cache) = self.cache.lock()
            && let Some(settings) = cache.as_ref()
        {
            return settings.clone();
        }

        let mut settings: AppSettings = read_json_or_default(&self.path);
        settings.shortcuts = merge_shortcuts(&settings.shortcuts);
        self.store_cache(settings.clone());
        settings
    }

    pub fn update(&self, update: SettingsUpdate) -> Result<AppSettings, StoreError> {
        let mut settings = self.get();
        settings.apply(update);
        write_json(&self.path, &settings)?;
        log::info!("settings updated");
        self.store_cache(settings.clone());
        Ok(settings)
    }

    pub fn frontmatter_enabled(&self) -> bool {
        self.get().frontmatter_enabled
    }

    /// Forget the cached copy so the next read goes to disk.
    pub fn reset_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    fn store_cache(&self, settings: AppSettings) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(settings);
        }
    }
}
