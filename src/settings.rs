use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::ExportFormat;

/// Returns the path to the settings file: `~/.config/samplifast/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("samplifast");
    path.push("settings.json");
    path
}

/// Persisted engine settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    // Playback
    /// Frames per device callback
    pub block_size: u32,

    // Session
    pub track_count: usize,
    /// Gain of a freshly created track (0.0 to 1.0)
    pub default_gain: f32,

    // Export
    pub export_format: ExportFormat,

    // History
    /// Maximum undo steps, 0 = unlimited
    pub history_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            block_size: 1024,
            track_count: 2,
            default_gain: 1.0,
            export_format: ExportFormat::Float32,
            history_limit: 50,
        }
    }
}

impl EngineSettings {
    /// Load settings from the default location, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    /// Load settings from a specific file, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings.sanitized()
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to the default location as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path());
    }

    /// Save settings to a specific file as pretty JSON.
    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Pull out-of-range values back into something usable
    fn sanitized(mut self) -> Self {
        if self.block_size == 0 {
            log::warn!("block_size 0 is invalid, using 1024");
            self.block_size = 1024;
        }
        if self.track_count == 0 {
            log::warn!("track_count 0 is invalid, using 1");
            self.track_count = 1;
        }
        self.default_gain = if self.default_gain.is_nan() {
            1.0
        } else {
            self.default_gain.clamp(0.0, 1.0)
        };
        self
    }
}
