/*!
 * Configuration Loading
 *
 * The config is a small YAML file, by default at
 * `$HOME/.report_ip/config.yaml`:
 *
 * ```yaml
 * redis:
 *   host: localhost
 *   port: 6379
 * ip_key: myhost:ip
 * ```
 *
 * It is loaded once at startup and never mutated. A missing file or a
 * missing/empty `redis.host` or `ip_key` is fatal; nothing is defaulted
 * except the optional connection settings.
 */

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config location relative to the home directory
pub const CONF_FILE: &str = ".report_ip/config.yaml";

/// Store calls give up after this long unless `redis.timeout_ms` says otherwise
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub redis: RedisConfig,
    pub ip_key: String,
}

/// Connection settings for the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Sent with `AUTH` right after connecting when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Logical database; `SELECT` is only sent for a non-zero value
    #[serde(default, skip_serializing_if = "is_zero")]
    pub db: i64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl RedisConfig {
    /// `host:port`, the form `TcpStream` and log lines want
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Read and validate the config at `path`.
    ///
    /// # Errors
    /// * `ConfigNotFound` - path is empty, missing, a directory, or unreadable
    /// * `ConfigParse` - bad YAML, wrong shape, or empty required field
    pub fn load(path: &Path) -> Result<Config> {
        if !is_regular_file(path) {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            log::debug!("reading {} failed: {}", path.display(), e);
            Error::ConfigNotFound(path.to_path_buf())
        })?;

        Self::parse(&text, path)
    }

    /// Parse config text that did not come from a file
    pub fn from_yaml(text: &str) -> Result<Config> {
        Self::parse(text, Path::new("<inline>"))
    }

    fn parse(text: &str, path: &Path) -> Result<Config> {
        let parse_err = |reason: String| Error::ConfigParse {
            path: path.to_path_buf(),
            reason,
        };

        let conf: Config = serde_yaml::from_str(text).map_err(|e| parse_err(e.to_string()))?;

        if conf.redis.host.trim().is_empty() {
            return Err(parse_err("redis.host must not be empty".into()));
        }
        if conf.ip_key.trim().is_empty() {
            return Err(parse_err("ip_key must not be empty".into()));
        }
        if conf.redis.timeout_ms == 0 {
            return Err(parse_err("redis.timeout_ms must be greater than zero".into()));
        }

        Ok(conf)
    }
}

/// `$HOME/.report_ip/config.yaml`, or the bare relative path without `HOME`
pub fn default_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(CONF_FILE),
        _ => PathBuf::from(CONF_FILE),
    }
}

fn is_regular_file(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
