//! Configuration: TOML file plus environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Limits;
use crate::error::Transience;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub limits: Limits,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Tree,
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            filter: None,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: LogRotation,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            format: LogFormat::Json,
            rotation: LogRotation::Daily,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn transience(&self) -> Transience {
        match self {
            ConfigError::Read { .. } => Transience::Unknown,
            ConfigError::Parse { .. } => Transience::Permanent,
        }
    }
}

/// Loads configuration from `path`; a missing file yields defaults.
/// Environment overrides apply last.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let mut config = if path.exists() {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(raw) = std::env::var("SYNCPOINT_FAILOVER_TABLE_CAPACITY") {
        match raw.parse::<usize>() {
            Ok(capacity) if capacity > 0 => config.limits.failover_table_capacity = capacity,
            _ => {
                tracing::warn!("invalid SYNCPOINT_FAILOVER_TABLE_CAPACITY, ignoring: {raw}");
            }
        }
    }
    if let Ok(filter) = std::env::var("SYNCPOINT_LOG_FILTER")
        && !filter.is_empty()
    {
        config.logging.filter = Some(filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load(&dir.path().join("syncpoint.toml")).expect("load");
        assert_eq!(config.limits.failover_table_capacity, 25);
        assert!(config.logging.stdout);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("syncpoint.toml");
        fs::write(
            &path,
            "[limits]\nfailover_table_capacity = 7\n\n[logging]\nstdout = false\n",
        )
        .expect("write config");

        let config = load(&path).expect("load");
        assert_eq!(config.limits.failover_table_capacity, 7);
        assert!(!config.logging.stdout);
        assert_eq!(config.limits.max_tracked_writes, 10_000);
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("syncpoint.toml");
        fs::write(&path, "limits = \"nope\"").expect("write config");

        let err = load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("syncpoint.toml"));
        assert_eq!(err.transience(), Transience::Permanent);
    }
}
