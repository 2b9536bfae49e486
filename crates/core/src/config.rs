use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resample::{BucketSpec, PeakMode};

/// User-tunable settings for extraction, bucketing and position updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub peak_mode: PeakMode,
    /// Width of one bar in a fixed-width view, in pixels.
    pub block_width: f32,
    /// Seconds of audio per bar in a scrolling view.
    pub sec_per_block: f32,
    pub poll_timeout_ms: u64,
    pub refresh_interval_ms: u64,
    pub snap_to_start_at_completion: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            peak_mode: PeakMode::Average,
            block_width: 10.0,
            sec_per_block: 0.5,
            poll_timeout_ms: 10,
            refresh_interval_ms: 20,
            snap_to_start_at_completion: true,
        }
    }
}

impl Settings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Bucket sizing for a fixed-width view `width` pixels wide.
    pub fn fit_width(&self, width: f32) -> BucketSpec {
        BucketSpec::FitWidth {
            width,
            block_width: self.block_width,
        }
    }

    /// Bucket sizing for a scrolling view.
    pub fn per_block(&self) -> BucketSpec {
        BucketSpec::PerBlock {
            sec_per_block: self.sec_per_block,
        }
    }
}

/// Loads and persists [`Settings`] as a JSON file.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

/// Valid values for each setting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub peak_mode: ConfigOption<PeakMode>,
    pub block_width: ConfigOption<f32>,
    pub sec_per_block: ConfigOption<f32>,
    pub poll_timeout_ms: ConfigOption<u64>,
    pub refresh_interval_ms: ConfigOption<u64>,
    pub snap_to_start_at_completion: ConfigOption<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOption<T> {
    pub default: T,
    pub valid_range: Option<(T, T)>,
    pub valid_choices: Option<Vec<T>>,
    pub description: String,
}

impl<T: PartialOrd + Copy + std::fmt::Display> ConfigOption<T> {
    fn check(&self, name: &str, value: T, errors: &mut Vec<String>) {
        if let Some((min, max)) = self.valid_range {
            // Written so NaN fails too
            if !(value >= min && value <= max) {
                errors.push(format!("{} must be between {} and {}", name, min, max));
            }
        }
    }
}

impl<T: PartialEq + std::fmt::Debug> ConfigOption<T> {
    fn check_choice(&self, name: &str, value: &T, errors: &mut Vec<String>) {
        if let Some(choices) = &self.valid_choices {
            if !choices.contains(value) {
                errors.push(format!("{} must be one of {:?}", name, choices));
            }
        }
    }
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: Settings,
    pub created_at: String,
    pub modified_at: String,
}

/// `<config dir>/wavesync/config.json`, or `config.json` in the working
/// directory when the platform has no config dir.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("wavesync").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("config.json"))
}

impl ConfigManager {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            config_path: config_path.unwrap_or_else(default_config_path),
            settings: Settings::default(),
        }
    }

    /// Load settings, writing a default file first if none exists.
    pub fn load(&mut self) -> Result<Settings, ConfigError> {
        if !self.config_path.exists() {
            log::info!("No config at {}; writing defaults", self.config_path.display());
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match application version {}",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        Self::validate_settings(&config_file.settings).map_err(ConfigError::ValidationError)?;

        self.settings = config_file.settings;
        Ok(self.settings.clone())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at: self.created_at().unwrap_or_else(|| now.clone()),
            modified_at: now,
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    // Creation time of the file already on disk, if it parses
    fn created_at(&self) -> Option<String> {
        let content = fs::read_to_string(&self.config_path).ok()?;
        let existing: ConfigFile = serde_json::from_str(&content).ok()?;
        Some(existing.created_at)
    }

    /// Validate, then replace the current settings and save.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        Self::validate_settings(&settings).map_err(ConfigError::ValidationError)?;
        self.settings = settings;
        self.save()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn schema() -> ConfigSchema {
        let defaults = Settings::default();
        ConfigSchema {
            peak_mode: ConfigOption {
                default: defaults.peak_mode,
                valid_range: None,
                valid_choices: Some(vec![PeakMode::Average, PeakMode::Max]),
                description: "How samples in a bucket collapse into one bar".to_string(),
            },
            block_width: ConfigOption {
                default: defaults.block_width,
                valid_range: Some((1.0, 200.0)),
                valid_choices: None,
                description: "Bar width in pixels for fixed-width views".to_string(),
            },
            sec_per_block: ConfigOption {
                default: defaults.sec_per_block,
                valid_range: Some((0.01, 60.0)),
                valid_choices: None,
                description: "Seconds of audio per bar in scrolling views".to_string(),
            },
            poll_timeout_ms: ConfigOption {
                default: defaults.poll_timeout_ms,
                valid_range: Some((1, 100)),
                valid_choices: None,
                description: "Decoder queue poll timeout in milliseconds".to_string(),
            },
            refresh_interval_ms: ConfigOption {
                default: defaults.refresh_interval_ms,
                valid_range: Some((5, 1000)),
                valid_choices: None,
                description: "Playback position refresh interval in milliseconds".to_string(),
            },
            snap_to_start_at_completion: ConfigOption {
                default: defaults.snap_to_start_at_completion,
                valid_range: None,
                valid_choices: None,
                description: "Rewind to the start when playback completes".to_string(),
            },
        }
    }

    /// Check settings against the schema, collecting every violation.
    pub fn validate_settings(settings: &Settings) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let schema = Self::schema();

        schema
            .peak_mode
            .check_choice("peak_mode", &settings.peak_mode, &mut errors);
        schema
            .block_width
            .check("block_width", settings.block_width, &mut errors);
        schema
            .sec_per_block
            .check("sec_per_block", settings.sec_per_block, &mut errors);
        schema
            .poll_timeout_ms
            .check("poll_timeout_ms", settings.poll_timeout_ms, &mut errors);
        schema
            .refresh_interval_ms
            .check("refresh_interval_ms", settings.refresh_interval_ms, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.settings = Settings::default();
        self.save()
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    ReadError(String),
    WriteError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(msg) => write!(f, "Failed to read config file: {}", msg),
            ConfigError::WriteError(msg) => write!(f, "Failed to write config file: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config file: {}", msg),
            ConfigError::SerializeError(msg) => write!(f, "Failed to serialize config: {}", msg),
            ConfigError::ValidationError(errors) => {
                write!(f, "Config validation errors: {}", errors.join(", "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_config_manager_new() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");

        let manager = ConfigManager::new(Some(config_path.clone()));
        assert_eq!(manager.config_path(), config_path);
        assert_eq!(manager.settings(), &Settings::default());
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let mut manager = ConfigManager::new(Some(config_path.clone()));
        let settings = manager.load().unwrap();

        assert_eq!(settings, Settings::default());
        assert!(config_path.exists());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");

        let mut manager = ConfigManager::new(Some(config_path.clone()));
        let settings = Settings {
            peak_mode: PeakMode::Max,
            refresh_interval_ms: 40,
            ..Settings::default()
        };
        manager.update_settings(settings).unwrap();

        let mut manager2 = ConfigManager::new(Some(config_path));
        let loaded = manager2.load().unwrap();

        assert_eq!(loaded.peak_mode, PeakMode::Max);
        assert_eq!(loaded.refresh_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_created_at_survives_resave() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");

        let manager = ConfigManager::new(Some(config_path.clone()));
        manager.save().unwrap();
        let first: ConfigFile =
            serde_json::from_str(&fs::read_to_string(&config_path).unwrap()).unwrap();

        manager.save().unwrap();
        let second: ConfigFile =
            serde_json::from_str(&fs::read_to_string(&config_path).unwrap()).unwrap();

        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut settings = Settings::default();
        assert!(ConfigManager::validate_settings(&settings).is_ok());

        settings.poll_timeout_ms = 0;
        settings.refresh_interval_ms = 5000;
        settings.block_width = f32::NAN;
        let errors = ConfigManager::validate_settings(&settings).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_choices_are_enforced() {
        let option = ConfigOption {
            default: PeakMode::Average,
            valid_range: None,
            valid_choices: Some(vec![PeakMode::Average]),
            description: String::new(),
        };
        let mut errors = Vec::new();
        option.check_choice("peak_mode", &PeakMode::Average, &mut errors);
        assert!(errors.is_empty());

        option.check_choice("peak_mode", &PeakMode::Max, &mut errors);
        assert_eq!(errors, vec!["peak_mode must be one of [Average]".to_string()]);

        let schema = ConfigManager::schema();
        for mode in [PeakMode::Average, PeakMode::Max] {
            let mut errors = Vec::new();
            schema.peak_mode.check_choice("peak_mode", &mode, &mut errors);
            assert!(errors.is_empty());
        }
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = ConfigManager::new(Some(temp_dir.path().join("config.json")));

        let settings = Settings {
            refresh_interval_ms: 1,
            ..Settings::default()
        };
        assert!(matches!(
            manager.update_settings(settings),
            Err(ConfigError::ValidationError(_))
        ));
        assert_eq!(manager.settings(), &Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(
            &config_path,
            r#"{"version":"0.0.0","settings":{"peak_mode":"max"},
               "created_at":"","modified_at":""}"#,
        )
        .unwrap();

        let mut manager = ConfigManager::new(Some(config_path));
        let settings = manager.load().unwrap();
        assert_eq!(settings.peak_mode, PeakMode::Max);
        assert_eq!(settings.poll_timeout_ms, 10);
    }

    #[test]
    fn test_bucket_specs_from_settings() {
        let settings = Settings::default();
        assert_eq!(
            settings.fit_width(300.0),
            BucketSpec::FitWidth {
                width: 300.0,
                block_width: 10.0
            }
        );
        assert_eq!(
            settings.per_block(),
            BucketSpec::PerBlock { sec_per_block: 0.5 }
        );
    }
}
