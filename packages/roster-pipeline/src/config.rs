//! Pipeline configuration
//!
//! Three layers, later ones win:
//!
//! 1. Built-in defaults ([`PipelineConfig::default`])
//! 2. YAML file (`version: 1` schema, unknown keys rejected)
//! 3. Environment (`ROSTER_SOURCE_DIR`, `ROSTER_DB_PATH`, `ROSTER_LOG_LEVEL`)
//!
//! The CLI applies its flags on top of the result.
//!
//! ```yaml
//! version: 1
//! sources:
//!   dir: rawData
//!   schedule: horarios.csv
//!   delimiter: ";"
//! store:
//!   path: acme_school.db
//! validation:
//!   id_pattern: "^[A-Z]{3}[0-9]{3}$"
//!   enforce_references: true
//! logging:
//!   level: debug
//!   json: false
//! ```

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::entities::EntityKind;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_ID_PATTERN: &str = "^[A-Z0-9]{6}$";

pub const ENV_SOURCE_DIR: &str = "ROSTER_SOURCE_DIR";
pub const ENV_DB_PATH: &str = "ROSTER_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "ROSTER_LOG_LEVEL";

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing version field in YAML
    #[error("Missing 'version' field in configuration file. Add 'version: 1' to the top of your YAML file.")]
    MissingVersion,

    /// Unsupported version
    #[error("Unsupported configuration version {found}. Supported versions: 1")]
    UnsupportedVersion { found: u64 },

    /// A value parsed but is not usable
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// IO error
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Where the four source files live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub dir: PathBuf,
    pub instructors: String,
    pub courses: String,
    pub learners: String,
    pub schedule: String,
    pub delimiter: char,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("rawData"),
            instructors: "instructors.csv".to_string(),
            courses: "courses.csv".to_string(),
            learners: "learners.csv".to_string(),
            schedule: "schedule.csv".to_string(),
            delimiter: ',',
        }
    }
}

impl SourceConfig {
    pub fn file_name(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Instructor => &self.instructors,
            EntityKind::Course => &self.courses,
            EntityKind::Learner => &self.learners,
            EntityKind::ScheduleSlot => &self.schedule,
        }
    }

    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(self.file_name(kind))
    }

    /// Delimiter as the single byte the CSV reader wants
    pub fn delimiter_byte(&self) -> u8 {
        // validate() guarantees ASCII
        self.delimiter as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("roster.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationSettings {
    /// Format every id-like field must match
    pub id_pattern: String,
    /// Check foreign keys against collections loaded earlier in the run
    pub enforce_references: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            id_pattern: DEFAULT_ID_PATTERN.to_string(),
            enforce_references: true,
        }
    }
}

impl ValidationSettings {
    pub fn compiled_id_pattern(&self) -> ConfigResult<Regex> {
        Regex::new(&self.id_pattern)
            .map_err(|e| ConfigError::invalid("validation.id_pattern", e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete pipeline configuration (YAML schema v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub version: u32,
    #[serde(default)]
    pub sources: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            sources: SourceConfig::default(),
            store: StoreConfig::default(),
            validation: ValidationSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        match raw.get("version") {
            None => return Err(ConfigError::MissingVersion),
            Some(v) => match v.as_u64() {
                Some(found) if found == u64::from(CONFIG_VERSION) => {}
                Some(found) => return Err(ConfigError::UnsupportedVersion { found }),
                None => return Err(ConfigError::invalid("version", "must be an integer")),
            },
        }

        let config: PipelineConfig = serde_yaml::from_value(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ROSTER_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_SOURCE_DIR).filter(|v| !v.is_empty()) {
            self.sources.dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: u64::from(self.version),
            });
        }

        let d = self.sources.delimiter;
        if !d.is_ascii() || matches!(d, '"' | '\n' | '\r') {
            return Err(ConfigError::invalid(
                "sources.delimiter",
                format!("{:?} is not a usable single-byte delimiter", d),
            ));
        }

        for kind in EntityKind::ALL {
            if self.sources.file_name(kind).trim().is_empty() {
                return Err(ConfigError::invalid(
                    &format!("sources.{}", kind.source_key()),
                    "file name must not be empty",
                ));
            }
        }

        self.validation.compiled_id_pattern()?;

        // Same syntax the binary hands to the subscriber
        EnvFilter::try_new(&self.logging.level)
            .map_err(|e| ConfigError::invalid("logging.level", e.to_string()))?;
        Ok(())
    }
}
