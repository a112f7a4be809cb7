// SPDX-License-Identifier: MPL-2.0
//! This module handles the pipeline's configuration, including loading and
//! saving user preferences to a `settings.toml` file.
//!
//! # Examples
//!
//! ```no_run
//! use media_spool::config::{self, Config};
//!
//! // Load existing configuration
//! let mut config = config::load().unwrap_or_default();
//!
//! // Modify a setting
//! config.normalize_loudness = Some(false);
//!
//! // Save the modified configuration
//! config::save(&config).expect("Failed to save config");
//! ```

pub mod defaults;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use defaults::{
    DEFAULT_BUFFER_SAMPLES, DEFAULT_NORMALIZE_LOUDNESS, DEFAULT_PREVIEW_VOLUME,
    DEFAULT_SAMPLE_RATE, MAX_SAMPLE_RATE, MIN_BUFFER_SAMPLES, MIN_SAMPLE_RATE,
};

const CONFIG_FILE: &str = "settings.toml";
const APP_NAME: &str = "MediaSpool";

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Target sample rate for decoded audio, in Hz.
    #[serde(default)]
    pub sample_rate: Option<u32>,
    /// Ring capacity in interleaved samples.
    #[serde(default)]
    pub buffer_samples: Option<usize>,
    /// Whether replay-gain tags are honored during playback.
    #[serde(default)]
    pub normalize_loudness: Option<bool>,
    /// Volume applied when rendering preview snapshots.
    #[serde(default)]
    pub preview_volume: Option<f32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: Some(DEFAULT_SAMPLE_RATE),
            buffer_samples: Some(DEFAULT_BUFFER_SAMPLES),
            normalize_loudness: Some(DEFAULT_NORMALIZE_LOUDNESS),
            preview_volume: Some(DEFAULT_PREVIEW_VOLUME),
        }
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<Config> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(Config::default())
}

pub fn save(config: &Config) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content).unwrap_or_default())
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip_preserves_settings() {
        let config = Config {
            sample_rate: Some(44_100),
            buffer_samples: Some(1 << 20),
            normalize_loudness: Some(false),
            preview_volume: Some(0.25),
        };
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        save_to_path(&config, &config_path).expect("failed to save config");
        let loaded = load_from_path(&config_path).expect("failed to load config");

        assert_eq!(loaded.sample_rate, config.sample_rate);
        assert_eq!(loaded.buffer_samples, config.buffer_samples);
        assert_eq!(loaded.normalize_loudness, config.normalize_loudness);
        assert_eq!(loaded.preview_volume, config.preview_volume);
    }

    #[test]
    fn load_from_path_returns_default_on_invalid_toml() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "sample_rate = \"not a number").expect("failed to write file");

        let loaded = load_from_path(&config_path).expect("load should not fail");
        assert_eq!(loaded.sample_rate, Some(DEFAULT_SAMPLE_RATE));
    }

    #[test]
    fn default_config_uses_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.sample_rate, Some(DEFAULT_SAMPLE_RATE));
        assert_eq!(config.buffer_samples, Some(DEFAULT_BUFFER_SAMPLES));
        assert_eq!(config.normalize_loudness, Some(DEFAULT_NORMALIZE_LOUDNESS));
    }
}
