//! Configuration for the transaction dependency engine.
//!
//! Loading strategy: start from the current directory, search a handful
//! of parent directories for `config.yaml`, fall back to hardcoded
//! defaults if nothing is found. A CLI-supplied path always wins over the
//! search.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConfigError;

/// How many parent directories to search for `config.yaml` when no path is
/// given explicitly.
const CONFIG_SEARCH_DEPTH: u32 = 3;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub trust: TrustConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub development: DevelopmentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Path to the sqlite database file (relative to `data_dir` unless
    /// absolute).
    #[serde(default = "default_db_file")]
    pub db_file: String,
    /// `PRAGMA cache_size` in KiB (negative pragma units), applied on open.
    #[serde(default = "default_cache_size_kib")]
    pub cache_size_kib: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrustConfig {
    /// Whether to seed the trust table with `default_trust_seed` on first
    /// open.
    #[serde(default = "default_seed_trust")]
    pub seed_default_trust: bool,
    /// Hex txids inserted with `value=1` via INSERT-OR-IGNORE on first
    /// open (kept in config rather than hardcoded so each deployment
    /// supplies its own).
    #[serde(default)]
    pub default_trust_seed: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Target URL for `WebhookEventSink`; disabled when absent.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DevelopmentConfig {
    /// Auto-exit after N seconds; useful for scripted runs and tests.
    #[serde(default)]
    pub default_duration_secs: Option<u64>,
}

fn default_db_file() -> String {
    "txdag.sqlite3".to_string()
}

fn default_cache_size_kib() -> i64 {
    64 * 1024
}

fn default_seed_trust() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
            trust: TrustConfig::default(),
            webhook: WebhookConfig::default(),
            development: DevelopmentConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            db_file: default_db_file(),
            cache_size_kib: default_cache_size_kib(),
        }
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        TrustConfig {
            seed_default_trust: default_seed_trust(),
            default_trust_seed: Vec::new(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig { url: None }
    }
}

impl Default for DevelopmentConfig {
    fn default() -> Self {
        DevelopmentConfig {
            default_duration_secs: None,
        }
    }
}

/// Load configuration from an explicit path, or by searching upward from the
/// current directory, falling back to defaults if nothing is found or the
/// file fails to parse.
pub fn load_config(explicit_path: Option<&str>) -> Config {
    if let Some(path) = explicit_path {
        return match read_config_file(Path::new(path)) {
            Ok(config) => {
                debug!("loaded configuration from {}", path);
                config
            }
            Err(e) => {
                warn!("failed to load config at {}: {}, using defaults", path, e);
                Config::default()
            }
        };
    }

    if let Some(found) = find_config_upward(&std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))) {
        match read_config_file(&found) {
            Ok(config) => {
                debug!("loaded configuration from {:?}", found);
                return config;
            }
            Err(e) => warn!("failed to parse {:?}: {}, using defaults", found, e),
        }
    }

    debug!("using default configuration");
    Config::default()
}

fn find_config_upward(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    for _ in 0..=CONFIG_SEARCH_DEPTH {
        let candidate = dir.join("config.yaml");
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.store.db_file, "txdag.sqlite3");
        assert_eq!(config.store.cache_size_kib, 64 * 1024);
        assert!(config.trust.seed_default_trust);
        assert_eq!(config.webhook.url, None);
        assert_eq!(config.development.default_duration_secs, None);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/nonexistent/config.yaml"));
        assert_eq!(config.store.db_file, "txdag.sqlite3");
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "store:\n  db_file: custom.sqlite3\n").unwrap();
        let config = load_config(Some(path.to_str().unwrap()));
        assert_eq!(config.store.db_file, "custom.sqlite3");
    }
}
