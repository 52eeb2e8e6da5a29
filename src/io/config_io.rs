use std::fs;
use std::path::{Path, PathBuf};

use crate::io::error::StoreError;
use crate::model::config::{AppConfig, ConfigFile, DEFAULT_WEB_PORT};

pub const CONFIG_FILENAME: &str = "planbook.toml";

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "PLANBOOK_CONFIG";

/// Keys accepted by `pb config set`
pub const SETTABLE_KEYS: &[&str] = &[
    "plans_dir",
    "archive_dir",
    "archive_retention_days",
    "max_file_size",
    "server.host",
    "server.port",
    "server.cors_origins",
];

/// Source of environment values; tests substitute a map.
pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Expand a leading `~/` using `$HOME`.
pub fn expand_home(path: &str, env: &dyn Env) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = env.var("HOME")
    {
        return Path::new(&home).join(rest);
    }
    PathBuf::from(path)
}

/// `~/.claude/plans`
pub fn default_plans_dir(env: &dyn Env) -> PathBuf {
    expand_home("~/.claude/plans", env)
}

/// Where `planbook.toml` is read from: `$PLANBOOK_CONFIG`, else the plans
/// directory chosen by flag or environment.
pub fn config_file_path(plans_dir_flag: Option<&Path>, env: &dyn Env) -> PathBuf {
    if let Some(path) = env.var(CONFIG_ENV) {
        return expand_home(&path, env);
    }
    let plans_dir = plans_dir_flag
        .map(Path::to_path_buf)
        .or_else(|| env.var("PLANS_DIR").map(|p| expand_home(&p, env)))
        .unwrap_or_else(|| default_plans_dir(env));
    plans_dir.join(CONFIG_FILENAME)
}

/// Read the config file, returning both the parsed config and the raw
/// toml_edit document for round-trip-safe editing. A missing file is `None`.
pub fn read_config_file(
    path: &Path,
) -> Result<Option<(ConfigFile, toml_edit::DocumentMut)>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let config: ConfigFile = toml::from_str(&text)?;
    let doc: toml_edit::DocumentMut = text.parse()?;
    Ok(Some((config, doc)))
}

/// Write the config document back to disk, preserving formatting.
pub fn write_config_file(path: &Path, doc: &toml_edit::DocumentMut) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
    }
    fs::write(path, doc.to_string()).map_err(StoreError::io(path))
}

fn parse_env<T: std::str::FromStr>(env: &dyn Env, key: &str) -> Option<T> {
    let raw = env.var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Combine defaults, the config file and the environment (which wins).
/// A `--plans-dir` flag beats all of them.
pub fn resolve_config(file: &ConfigFile, env: &dyn Env, plans_dir_flag: Option<&Path>) -> AppConfig {
    let plans_dir = plans_dir_flag
        .map(Path::to_path_buf)
        .or_else(|| env.var("PLANS_DIR").map(|p| expand_home(&p, env)))
        .or_else(|| file.plans_dir.as_deref().map(|p| expand_home(p, env)))
        .unwrap_or_else(|| default_plans_dir(env));

    let mut config = AppConfig::with_plans_dir(plans_dir);

    if let Some(dir) = env
        .var("ARCHIVE_DIR")
        .or_else(|| file.archive_dir.clone())
    {
        config.archive_dir = expand_home(&dir, env);
    }
    if let Some(host) = env.var("HOST").or_else(|| file.server.host.clone()) {
        config.host = host;
    }
    if let Some(port) = parse_env(env, "PORT")
        .or_else(|| parse_env(env, "API_PORT"))
        .or(file.server.port)
    {
        config.port = port;
    }
    if let Some(origins) = env.var("CORS_ORIGINS") {
        config.cors_origins = split_list(&origins);
    } else if let Some(origins) = &file.server.cors_origins {
        config.cors_origins = origins.clone();
    } else {
        let web_port: u16 = parse_env(env, "WEB_PORT").unwrap_or(DEFAULT_WEB_PORT);
        config.cors_origins = vec![format!("http://localhost:{}", web_port)];
    }
    if let Some(size) = parse_env(env, "MAX_FILE_SIZE").or(file.max_file_size) {
        config.max_file_size = size;
    }
    if let Some(days) = parse_env(env, "ARCHIVE_RETENTION_DAYS").or(file.archive_retention_days) {
        config.archive_retention_days = days;
    }
    config
}

/// Load configuration for this process: `.env`, then `planbook.toml`,
/// then environment variables, then the `--plans-dir` flag.
pub fn load_config(plans_dir_flag: Option<&Path>) -> Result<AppConfig, StoreError> {
    if let Ok(path) = dotenvy::dotenv() {
        log::debug!("loaded environment from {}", path.display());
    }
    let env = ProcessEnv;
    let path = config_file_path(plans_dir_flag, &env);
    let file = match read_config_file(&path)? {
        Some((file, _)) => {
            log::debug!("read config from {}", path.display());
            file
        }
        None => ConfigFile::default(),
    };
    Ok(resolve_config(&file, &env, plans_dir_flag))
}

/// Set one key in the config document. Values are typed by key; the edited
/// document must still parse as a config.
pub fn set_config_value(
    doc: &mut toml_edit::DocumentMut,
    key: &str,
    value: &str,
) -> Result<(), StoreError> {
    let invalid = || StoreError::Invalid(format!("invalid value for {}: {}", key, value));
    let item = match key {
        "plans_dir" | "archive_dir" | "server.host" => toml_edit::value(value),
        "archive_retention_days" | "max_file_size" | "server.port" => {
            let n: i64 = value.trim().parse().map_err(|_| invalid())?;
            toml_edit::value(n)
        }
        "server.cors_origins" => {
            let array: toml_edit::Array = split_list(value).into_iter().collect();
            toml_edit::value(array)
        }
        _ => {
            return Err(StoreError::Invalid(format!(
                "unknown config key {} (expected one of: {})",
                key,
                SETTABLE_KEYS.join(", ")
            )));
        }
    };

    match key.split_once('.') {
        Some((table, field)) => {
            if !doc.contains_key(table) {
                doc[table] = toml_edit::Item::Table(toml_edit::Table::new());
            }
            doc[table][field] = item;
        }
        None => doc[key] = item,
    }

    // Out-of-range numbers (a port above 65535, say) fail here
    toml::from_str::<ConfigFile>(&doc.to_string()).map_err(|_| invalid())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct MapEnv(HashMap<&'static str, &'static str>);

    impl Env for MapEnv {
        fn var(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }
    }

    fn env(pairs: &[(&'static str, &'static str)]) -> MapEnv {
        MapEnv(pairs.iter().copied().collect())
    }

    #[test]
    fn test_defaults() {
        let config = resolve_config(&ConfigFile::default(), &env(&[("HOME", "/home/u")]), None);
        assert_eq!(config.plans_dir, PathBuf::from("/home/u/.claude/plans"));
        assert_eq!(config.archive_dir, PathBuf::from("/home/u/.claude/plans/archive"));
        assert_eq!(config.port, 3001);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.archive_retention_days, 30);
    }

    #[test]
    fn test_env_beats_file_and_flag_beats_env() {
        let file: ConfigFile = toml::from_str(
            "plans_dir = \"/from/file\"\narchive_retention_days = 7\n[server]\nport = 4000\n",
        )
        .unwrap();
        let e = env(&[
            ("PLANS_DIR", "/from/env"),
            ("API_PORT", "5000"),
            ("WEB_PORT", "8080"),
        ]);

        let config = resolve_config(&file, &e, None);
        assert_eq!(config.plans_dir, PathBuf::from("/from/env"));
        assert_eq!(config.port, 5000);
        assert_eq!(config.archive_retention_days, 7);
        assert_eq!(config.cors_origins, vec!["http://localhost:8080"]);

        let flagged = resolve_config(&file, &e, Some(Path::new("/flag")));
        assert_eq!(flagged.plans_dir, PathBuf::from("/flag"));
        assert_eq!(flagged.archive_dir, PathBuf::from("/flag/archive"));
    }

    #[test]
    fn test_port_prefers_port_over_api_port() {
        let config = resolve_config(
            &ConfigFile::default(),
            &env(&[("PORT", "9000"), ("API_PORT", "5000"), ("HOME", "/h")]),
            None,
        );
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_bad_env_number_is_ignored() {
        let config = resolve_config(
            &ConfigFile::default(),
            &env(&[("PORT", "lots"), ("HOME", "/h")]),
            None,
        );
        assert_eq!(config.port, 3001);
    }

    #[test]
    fn test_cors_list_from_env() {
        let config = resolve_config(
            &ConfigFile::default(),
            &env(&[("CORS_ORIGINS", "http://a, http://b,"), ("HOME", "/h")]),
            None,
        );
        assert_eq!(config.cors_origins, vec!["http://a", "http://b"]);
    }

    #[test]
    fn test_config_env_overrides_path() {
        let e = env(&[("PLANBOOK_CONFIG", "/etc/pb.toml"), ("PLANS_DIR", "/p")]);
        assert_eq!(config_file_path(None, &e), PathBuf::from("/etc/pb.toml"));
        let e = env(&[("PLANS_DIR", "/p")]);
        assert_eq!(config_file_path(None, &e), PathBuf::from("/p/planbook.toml"));
    }

    #[test]
    fn test_set_value_preserves_comments() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, "# my plans\nplans_dir = \"/old\"\n").unwrap();

        let (_, mut doc) = read_config_file(&path).unwrap().unwrap();
        set_config_value(&mut doc, "plans_dir", "/new").unwrap();
        set_config_value(&mut doc, "server.port", "4100").unwrap();
        set_config_value(&mut doc, "server.cors_origins", "http://a,http://b").unwrap();
        write_config_file(&path, &doc).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# my plans\n"));
        let (file, _) = read_config_file(&path).unwrap().unwrap();
        assert_eq!(file.plans_dir.as_deref(), Some("/new"));
        assert_eq!(file.server.port, Some(4100));
        assert_eq!(
            file.server.cors_origins,
            Some(vec!["http://a".to_string(), "http://b".to_string()])
        );
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut doc = toml_edit::DocumentMut::new();
        assert!(set_config_value(&mut doc, "colour", "red").is_err());
        assert!(set_config_value(&mut doc, "server.port", "http").is_err());
        assert!(set_config_value(&mut doc, "server.port", "70000").is_err());
    }

    #[test]
    fn test_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(read_config_file(&tmp.path().join("nope.toml")).unwrap().is_none());
    }
}
