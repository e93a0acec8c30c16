//! Runtime configuration
//!
//! Defaults, overlaid by `MENUCACHE_*` environment variables, overlaid by
//! command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;

use crate::cache::DEFAULT_TTL;
use crate::data::{DINING_COURTS, MENU_API_URL};
use crate::service::DEFAULT_FETCH_TIMEOUT;
use crate::sweep::DEFAULT_SWEEP_INTERVAL;

pub const ENV_API_URL: &str = "MENUCACHE_API_URL";
pub const ENV_CACHE_DIR: &str = "MENUCACHE_CACHE_DIR";
pub const ENV_TTL_HOURS: &str = "MENUCACHE_TTL_HOURS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "MENUCACHE_FETCH_TIMEOUT_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "MENUCACHE_SWEEP_INTERVAL_SECS";
pub const ENV_COURTS: &str = "MENUCACHE_COURTS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    /// Root under which the server and client caches live
    pub cache_dir: PathBuf,
    pub ttl: Duration,
    pub fetch_timeout: Duration,
    pub sweep_interval: Duration,
    pub courts: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: MENU_API_URL.to_string(),
            cache_dir: default_cache_dir(),
            ttl: DEFAULT_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            courts: DINING_COURTS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", "menucache")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("menucache"))
}

impl Config {
    /// Defaults overlaid by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_API_URL) {
            config.api_url = url;
        }
        if let Some(dir) = get(ENV_CACHE_DIR) {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(hours) = get(ENV_TTL_HOURS) {
            let secs = parse_positive(ENV_TTL_HOURS, &hours)?
                .checked_mul(SECS_PER_HOUR)
                .ok_or_else(|| ConfigError::Invalid {
                    var: ENV_TTL_HOURS,
                    value: hours.clone(),
                })?;
            config.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = get(ENV_FETCH_TIMEOUT_SECS) {
            config.fetch_timeout = Duration::from_secs(parse_positive(ENV_FETCH_TIMEOUT_SECS, &secs)?);
        }
        if let Some(secs) = get(ENV_SWEEP_INTERVAL_SECS) {
            config.sweep_interval = Duration::from_secs(parse_positive(ENV_SWEEP_INTERVAL_SECS, &secs)?);
        }
        if let Some(raw) = get(ENV_COURTS) {
            let courts: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
            if courts.is_empty() {
                return Err(ConfigError::Invalid {
                    var: ENV_COURTS,
                    value: raw,
                });
            }
            config.courts = courts;
        }

        Ok(config)
    }

    /// Applies command-line overrides
    pub fn with_overrides(mut self, cache_dir: Option<&Path>, api_url: Option<&str>) -> Self {
        if let Some(dir) = cache_dir {
            self.cache_dir = dir.to_path_buf();
        }
        if let Some(url) = api_url {
            self.api_url = url.to_string();
        }
        self
    }

    /// Directory of the TTL cache in front of the upstream API
    pub fn server_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("server")
    }

    /// Directory of the day-scoped client cache
    pub fn client_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("client")
    }
}

const SECS_PER_HOUR: u64 = 60 * 60;

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}
