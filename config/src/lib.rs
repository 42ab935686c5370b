//! Plex configuration file.
//!
//! Looked up at `$PLEX_CONFIG`, else `~/.plex/config.toml`. Every section
//! and key is optional.
//!
//! ```toml
//! [dispatch]
//! default_timeout_ms = 5000
//! default_format = "json"
//!
//! [limits]
//! max_requests = 64
//! max_message_bytes = 1048576
//!
//! [log]
//! level = "${PLEX_LOG_LEVEL}"
//! ```

use std::path::{Path, PathBuf};
use std::{env, fs};

use plex_types::Format;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "PLEX_CONFIG";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlexConfig {
    pub dispatch: Option<DispatchConfig>,
    pub limits: Option<LimitsConfig>,
    pub log: Option<LogConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Wait applied when an envelope has no `connection-timeout`.
    /// Negative waits forever.
    pub default_timeout_ms: Option<i64>,
    /// Format assumed when the transport does not say.
    pub default_format: Option<Format>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_requests: Option<usize>,
    pub max_message_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    level: Option<String>,
}

impl LogConfig {
    /// Level filter with `${VAR}` references expanded. Blank counts as unset.
    #[must_use]
    pub fn level(&self) -> Option<String> {
        self.level
            .as_deref()
            .map(expand_env_vars)
            .filter(|level| !level.trim().is_empty())
    }
}

/// Expand `${VAR}` references from the environment. Unset variables expand
/// to nothing; an unterminated `${` is kept literally.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(open) = rest.find("${") {
        let Some(close) = rest[open + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let var = &rest[open + 2..open + 2 + close];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[open + 2 + close + 1..];
    }
    out.push_str(rest);
    out
}

impl PlexConfig {
    /// Load from the default location. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load from `path`. A missing file is `Ok(None)`.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".plex").join("config.toml"))
}
