//! Configuration file support.
//!
//! Settings live in a versioned JSON file under the user's config directory.
//! Every section has defaults, so a partial file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::format::{AutoSaveManager, EXPORTS_DIR_NAME, ExportOptions, UnlabeledPolicy};
use crate::undo::UndoConfig;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Get the display name for this log level.
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Get all log levels in order from least to most verbose.
    pub fn all() -> &'static [LogLevel] {
        &[
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|level| level.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Editor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Version of the configuration file format
    pub version: u32,

    #[serde(default)]
    pub preferences: UserPreferences,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub autosave: AutoSaveConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub classes: ClassesConfig,
}

/// User preferences section of the config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Undo history section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Number of undoable steps to keep
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_max_history() -> usize {
    UndoConfig::default().max_history
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

/// Auto-save timing section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet time after the last edit before saving
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Minimum time between two saves
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    AutoSaveManager::DEFAULT_DEBOUNCE_DELAY.as_millis() as u64
}

fn default_min_interval_ms() -> u64 {
    AutoSaveManager::DEFAULT_SAVE_INTERVAL.as_millis() as u64
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

/// Export section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// What to do with boxes that have no class
    #[serde(default)]
    pub unlabeled: UnlabeledPolicy,

    /// Decimal places for normalized YOLO values
    #[serde(default = "default_yolo_precision")]
    pub yolo_precision: usize,

    /// Name of the exports directory next to `project.json`
    #[serde(default = "default_exports_dir_name")]
    pub exports_dir_name: String,
}

fn default_yolo_precision() -> usize {
    ExportOptions::default().yolo_precision
}

fn default_exports_dir_name() -> String {
    EXPORTS_DIR_NAME.to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            unlabeled: UnlabeledPolicy::default(),
            yolo_precision: default_yolo_precision(),
            exports_dir_name: default_exports_dir_name(),
        }
    }
}

/// Class defaults section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassesConfig {
    /// Classes every new project starts with
    #[serde(default = "default_class_names")]
    pub defaults: Vec<String>,

    /// Whether deleting a class in use unassigns its boxes instead of failing
    #[serde(default)]
    pub cascade_on_delete: bool,
}

fn default_class_names() -> Vec<String> {
    vec!["object".to_string()]
}

impl Default for ClassesConfig {
    fn default() -> Self {
        Self {
            defaults: default_class_names(),
            cascade_on_delete: false,
        }
    }
}

impl EditorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            preferences: UserPreferences::default(),
            history: HistoryConfig::default(),
            autosave: AutoSaveConfig::default(),
            export: ExportConfig::default(),
            classes: ClassesConfig::default(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Get the default filename for the config file.
    pub fn default_filename() -> &'static str {
        "boxlabel-config.json"
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("boxlabel").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("boxlabel")
                    .join(Self::default_filename())
            })
        }
    }

    /// Read configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match Self::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to load config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Write configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let mut json = self.to_json()?;
        json.push('\n');
        crate::format::write_atomic(path, json.as_bytes())
            .map_err(|e| ConfigError::Write(e.to_string()))?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Save configuration to the default path.
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        self.save(&path)
    }

    pub fn undo_config(&self) -> UndoConfig {
        UndoConfig {
            max_history: self.history.max_history,
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions::new()
            .unlabeled(self.export.unlabeled.clone())
            .yolo_precision(self.export.yolo_precision)
    }

    /// Build an auto-save scheduler from the `autosave` section.
    pub fn auto_save_manager(&self) -> AutoSaveManager {
        let mut manager = AutoSaveManager::new()
            .with_debounce_delay(Duration::from_millis(self.autosave.debounce_ms))
            .with_save_interval(Duration::from_millis(self.autosave.min_interval_ms));
        manager.set_enabled(self.autosave.enabled);
        manager
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Writing the config file failed
    #[error("Failed to write configuration: {0}")]
    Write(String),

    #[error("Could not determine config directory")]
    NoConfigDir,
}
