use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_WEB_PORT: u16 = 5173;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_PREVIEW_LENGTH: usize = 200;
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Resolved runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub plans_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Upper bound on plan content accepted by create/update
    pub max_file_size: u64,
    pub preview_length: usize,
    pub archive_retention_days: i64,
}

impl AppConfig {
    /// Defaults rooted at `plans_dir`; the archive lives beneath it.
    pub fn with_plans_dir(plans_dir: impl Into<PathBuf>) -> Self {
        let plans_dir = plans_dir.into();
        AppConfig {
            archive_dir: plans_dir.join("archive"),
            plans_dir,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: vec![format!("http://localhost:{}", DEFAULT_WEB_PORT)],
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            preview_length: DEFAULT_PREVIEW_LENGTH,
            archive_retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Contents of `planbook.toml`. Every key is optional; environment
/// variables override whatever is set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub plans_dir: Option<String>,
    #[serde(default)]
    pub archive_dir: Option<String>,
    #[serde(default)]
    pub archive_retention_days: Option<i64>,
    #[serde(default)]
    pub max_file_size: Option<u64>,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub cors_origins: Option<Vec<String>>,
}
