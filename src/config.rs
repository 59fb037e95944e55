use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const TAG_SERVICE_URL_ENV: &str = "DUPETAG_TAG_SERVICE_URL";
pub const SIMILARITY_THRESHOLD_ENV: &str = "DUPETAG_SIMILARITY_THRESHOLD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tag_service_url: String,
    pub similarity_service_url: Option<String>,
    pub similarity_threshold: f64,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tag_service_url: "http://127.0.0.1:8080".to_string(),
            similarity_service_url: None,
            similarity_threshold: 0.85,
            request_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from the per-user config file when one exists,
    /// falling back to defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// `<config_dir>/dupetag/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dupetag").join("config.toml"))
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(TAG_SERVICE_URL_ENV) {
            self.tag_service_url = url;
        }
        if let Some(raw) = lookup(SIMILARITY_THRESHOLD_ENV) {
            self.similarity_threshold = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                field: SIMILARITY_THRESHOLD_ENV.to_string(),
                message: format!("not a number: {}", raw),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tag_service_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "tag_service_url".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if matches!(&self.similarity_service_url, Some(url) if url.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "similarity_service_url".to_string(),
                message: "must not be empty when set".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid {
                field: "similarity_threshold".to_string(),
                message: format!("{} is outside 0.0..=1.0", self.similarity_threshold),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn similarity_service_url(&self) -> &str {
        self.similarity_service_url
            .as_deref()
            .unwrap_or(&self.tag_service_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
