//! Server configuration loading.
//!
//! Settings come from a JSON file (optional) and are then overridden by
//! environment variables.
//!
//! File selection priority:
//! 1. `RELAYCHAT_CONFIG` env var: explicit path, must exist
//! 2. `<platform config dir>/relaychat/config.json` if present
//! 3. Built-in defaults

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_HISTORY_LIMIT;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "RELAYCHAT_CONFIG";
/// Environment override for [`Config::bind_addr`].
pub const BIND_ADDR_ENV: &str = "RELAYCHAT_BIND_ADDR";
/// Environment override for [`Config::history_limit`].
pub const HISTORY_LIMIT_ENV: &str = "RELAYCHAT_HISTORY_LIMIT";

/// Configuration for the chat server.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Address every listed port is bound on.
    pub bind_addr: IpAddr,
    /// Number of recent messages replayed to newcomers.
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Config {
    /// Default config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("relaychat").join("config.json"))
    }

    /// Load configuration using the file priority above, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            Self::load_from(Path::new(&path))?
        } else {
            match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => Self::default(),
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific JSON file (no env overrides).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.normalize();
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `RELAYCHAT_*` environment overrides. Unparseable values are
    /// logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(BIND_ADDR_ENV) {
            match raw.trim().parse() {
                Ok(addr) => self.bind_addr = addr,
                Err(e) => log::warn!("Ignoring {BIND_ADDR_ENV}={raw:?}: {e}"),
            }
        }
        if let Some(raw) = lookup(HISTORY_LIMIT_ENV) {
            match raw.trim().parse() {
                Ok(limit) => self.history_limit = limit,
                Err(e) => log::warn!("Ignoring {HISTORY_LIMIT_ENV}={raw:?}: {e}"),
            }
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        if self.history_limit == 0 {
            log::warn!("history_limit of 0 is not allowed, using 1");
            self.history_limit = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.history_limit, 100);
    }

    #[test]
    fn test_load_from_partial_file_fills_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{ "history_limit": 25 }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.history_limit, 25);
        assert_eq!(config.bind_addr, Config::default().bind_addr);
    }

    #[test]
    fn test_load_from_missing_file_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = Config::load_from(&tmp.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"), "{err}");
    }

    #[test]
    fn test_load_from_invalid_json_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            (BIND_ADDR_ENV, "127.0.0.1"),
            (HISTORY_LIMIT_ENV, " 7 "),
        ]));
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.history_limit, 7);
    }

    #[test]
    fn test_bad_env_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            (BIND_ADDR_ENV, "not-an-ip"),
            (HISTORY_LIMIT_ENV, "lots"),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_zero_history_limit_is_clamped() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[(HISTORY_LIMIT_ENV, "0")]));
        assert_eq!(config.history_limit, 1);
    }
}
