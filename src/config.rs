//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\lowhum\config.toml
//! - macOS: ~/Library/Application Support/lowhum/config.toml
//! - Linux: ~/.config/lowhum/config.toml
//!
//! The config file is human-readable and editable. Settings are loaded at
//! startup; loading never fails, it logs and falls back to defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playback settings
    pub audio: AudioConfig,

    /// Device watcher settings
    pub watcher: WatcherConfig,

    /// Noise generation settings
    pub noise: NoiseConfig,
}

/// Audio playback settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Selected output device name (empty = system default). Stored by name
    /// rather than index because indices are not stable across OS
    /// re-enumeration; the name is re-resolved at play time.
    pub output_device: String,
}

/// Device watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Whether to watch for output device changes during playback
    pub enabled: bool,

    /// Seconds between device polls
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 2,
        }
    }
}

/// Noise file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Path to the audio file to loop (empty = generated default)
    pub file: Option<PathBuf>,

    /// Duration of the generated file in minutes
    pub minutes: u64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            file: None,
            minutes: 60,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lowhum"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::debug!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[audio]"));
        assert!(toml.contains("[watcher]"));
        assert!(toml.contains("[noise]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.audio.output_device = "USB DAC".to_string();
        config.watcher.poll_interval_secs = 5;
        config.noise.file = Some(PathBuf::from("/sounds/rain.wav"));

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.audio.output_device, "USB DAC");
        assert_eq!(parsed.watcher.poll_interval_secs, 5);
        assert_eq!(parsed.noise.file, Some(PathBuf::from("/sounds/rain.wav")));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[audio]
output_device = "Speakers"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.audio.output_device, "Speakers");
        assert!(config.watcher.enabled);
        assert_eq!(config.watcher.poll_interval_secs, 2);
        assert_eq!(config.noise.minutes, 60);
        assert!(config.noise.file.is_none());
    }
}
