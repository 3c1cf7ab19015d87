use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from stopguard.toml.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StopguardConfig {
    pub lifecycle: LifecycleConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Budget for each stop attempt. A stop call makes at most two attempts.
    pub stop_timeout_ms: u64,
}

/// The command run as the supervised service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub command: String,
    pub args: Vec<String>,
}

// --- Default implementations ---

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 10_000,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            command: "sleep".to_string(),
            args: vec!["infinity".to_string()],
        }
    }
}

impl LifecycleConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Errors produced while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Parsed fine but a value is out of range.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl StopguardConfig {
    /// Load and validate a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic checks serde can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lifecycle.stop_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "lifecycle.stop_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.service.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "service.command must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
