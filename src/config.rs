use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "NEARFEED";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub prefetch: PrefetchConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub session_cookie: String,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            user_agent: default_user_agent(),
            session_cookie: String::new(),
            timeout: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_page_size() -> usize {
    20
}

fn default_user_agent() -> String {
    format!("nearfeed/{}", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutConfig {
    #[serde(default = "default_row_height")]
    pub row_height: f64,
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    #[serde(default = "default_container_width")]
    pub container_width: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            row_height: default_row_height(),
            spacing: default_spacing(),
            container_width: default_container_width(),
        }
    }
}

fn default_row_height() -> f64 {
    240.0
}

fn default_spacing() -> f64 {
    4.0
}

fn default_container_width() -> f64 {
    1280.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrefetchConfig {
    #[serde(default = "default_sentinel_distance")]
    pub sentinel_distance: f64,
    #[serde(default = "default_load_threshold")]
    pub load_threshold: f64,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: f64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            sentinel_distance: default_sentinel_distance(),
            load_threshold: default_load_threshold(),
            viewport_height: default_viewport_height(),
        }
    }
}

fn default_sentinel_distance() -> f64 {
    1200.0
}

fn default_load_threshold() -> f64 {
    300.0
}

fn default_viewport_height() -> f64 {
    900.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = apply_env(cfg, prefix);

    anyhow::ensure!(cfg.api.page_size > 0, "config: api.page_size must be positive");
    anyhow::ensure!(
        cfg.layout.row_height > 0.0,
        "config: layout.row_height must be positive"
    );

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if other.api.page_size != 0 {
        base.api.page_size = other.api.page_size;
    }
    if !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if !other.api.session_cookie.is_empty() {
        base.api.session_cookie = other.api.session_cookie;
    }
    if other.api.timeout.is_some() {
        base.api.timeout = other.api.timeout;
    }

    if other.layout.row_height > 0.0 {
        base.layout.row_height = other.layout.row_height;
    }
    if other.layout.spacing >= 0.0 {
        base.layout.spacing = other.layout.spacing;
    }
    if other.layout.container_width > 0.0 {
        base.layout.container_width = other.layout.container_width;
    }

    if other.prefetch.sentinel_distance >= 0.0 {
        base.prefetch.sentinel_distance = other.prefetch.sentinel_distance;
    }
    if other.prefetch.load_threshold >= 0.0 {
        base.prefetch.load_threshold = other.prefetch.load_threshold;
    }
    if other.prefetch.viewport_height > 0.0 {
        base.prefetch.viewport_height = other.prefetch.viewport_height;
    }

    if other.log.file.is_some() {
        base.log.file = other.log.file;
    }
    if !other.log.filter.is_empty() {
        base.log.filter = other.log.filter;
    }

    base
}

fn apply_env(mut cfg: Config, prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.session_cookie" => cfg.api.session_cookie = value,
        "api.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.api.page_size = parsed;
            }
        }
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = Some(duration);
            }
        }
        "layout.row_height" => set_f64(&mut cfg.layout.row_height, &value),
        "layout.spacing" => set_f64(&mut cfg.layout.spacing, &value),
        "layout.container_width" => set_f64(&mut cfg.layout.container_width, &value),
        "prefetch.sentinel_distance" => set_f64(&mut cfg.prefetch.sentinel_distance, &value),
        "prefetch.load_threshold" => set_f64(&mut cfg.prefetch.load_threshold, &value),
        "prefetch.viewport_height" => set_f64(&mut cfg.prefetch.viewport_height, &value),
        "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        "log.filter" => cfg.log.filter = value,
        _ => {}
    }
}

fn set_f64(slot: &mut f64, value: &str) {
    if let Ok(parsed) = value.trim().parse::<f64>() {
        *slot = parsed;
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nearfeed").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("NEARFEED_TEST_DEFAULTS".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.page_size, 20);
        assert_eq!(cfg.api.base_url, default_base_url());
        assert_eq!(cfg.api.timeout, None);
        assert_eq!(cfg.layout.row_height, 240.0);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  base_url: http://feed.local:9000\n  page_size: 30\n  timeout: 5s\nlayout:\n  row_height: 180\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("NEARFEED_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "http://feed.local:9000");
        assert_eq!(cfg.api.page_size, 30);
        assert_eq!(cfg.api.timeout, Some(Duration::from_secs(5)));
        assert_eq!(cfg.layout.row_height, 180.0);
        assert_eq!(cfg.layout.spacing, 4.0);
    }

    #[test]
    fn env_overrides() {
        env::set_var("NEARFEED_TEST_ENV_API__PAGE_SIZE", "12");
        env::set_var("NEARFEED_TEST_ENV_LAYOUT__SPACING", "8");
        let cfg = load(LoadOptions {
            config_file: None,
            env_prefix: Some("NEARFEED_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.page_size, 12);
        assert_eq!(cfg.layout.spacing, 8.0);
        env::remove_var("NEARFEED_TEST_ENV_API__PAGE_SIZE");
        env::remove_var("NEARFEED_TEST_ENV_LAYOUT__SPACING");
    }

    #[test]
    fn zero_page_size_is_rejected() {
        env::set_var("NEARFEED_TEST_ZERO_API__PAGE_SIZE", "0");
        let result = load(LoadOptions {
            config_file: None,
            env_prefix: Some("NEARFEED_TEST_ZERO".into()),
        });
        env::remove_var("NEARFEED_TEST_ZERO_API__PAGE_SIZE");
        assert!(result.is_err());
    }
}
