use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use log::LevelFilter;
use runsync_engine::{BackendSettings, DEFAULT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "runsync.ron";
const DEFAULT_DATA_DIR: &str = "./.runsync";
/// Lower bound for the status check interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub poll_interval_ms: u64,
    pub log_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: BackendSettings::default().base_url,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            log_file: None,
            log_level: "info".to_string(),
        }
    }
}

/// Values given on the command line (or through their environment fallbacks).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// A loaded configuration plus a problem worth logging once logging is up.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub warning: Option<String>,
}

impl AppConfig {
    /// Reads `explicit`, or [`DEFAULT_CONFIG_FILE`] when it exists.
    ///
    /// An explicit file that cannot be read is an error. Unparsable content
    /// falls back to defaults and is reported through `warning`.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
        let (path, content) = match explicit {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                (path.to_path_buf(), content)
            }
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                match fs::read_to_string(&path) {
                    Ok(content) => (path, content),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        return Ok(LoadedConfig {
                            config: Self::default(),
                            warning: None,
                        });
                    }
                    Err(err) => {
                        return Ok(LoadedConfig {
                            config: Self::default(),
                            warning: Some(format!("Failed to read {}: {}", path.display(), err)),
                        });
                    }
                }
            }
        };
        Ok(Self::parse(&path, &content))
    }

    fn parse(path: &Path, content: &str) -> LoadedConfig {
        match ron::from_str(content) {
            Ok(config) => LoadedConfig {
                config,
                warning: None,
            },
            Err(err) => LoadedConfig {
                config: Self::default(),
                warning: Some(format!(
                    "Ignoring unparsable config {}: {}",
                    path.display(),
                    err
                )),
            },
        }
    }

    pub fn merged(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(base_url) = overrides.base_url {
            self.base_url = base_url;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(poll_interval_ms) = overrides.poll_interval_ms {
            self.poll_interval_ms = poll_interval_ms;
        }
        if overrides.log_file.is_some() {
            self.log_file = overrides.log_file;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
        self.poll_interval_ms = self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
        self
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .with_context(|| format!("Unknown log level {:?}", self.log_level))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            base_url: self.base_url.clone(),
            ..BackendSettings::default()
        }
    }
}
