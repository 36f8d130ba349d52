//! Persisted audio settings.
//!
//! This module provides:
//! - `AudioSettings`: master/sfx/music volumes and mute flags
//! - `AudioSettingsPatch`: partial updates merged with clamping
//! - `SettingsStore`: key/value persistence (file-backed or in memory)
//!
//! Settings are stored as camelCase JSON under [`SETTINGS_KEY`]. Missing
//! fields fall back to defaults and every value is clamped after load.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sketchplay_kernel::audio_backend::clamp_volume;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Key the settings are persisted under.
pub const SETTINGS_KEY: &str = "sketchplay_audio_settings";

/// Settings directory name under the platform config directory.
pub const SETTINGS_DIR_NAME: &str = "sketchplay";

/// Errors that can occur while persisting settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Audio volumes and mute flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioSettings {
    /// Master volume (0.0 - 1.0).
    pub master_volume: f32,
    /// Sound effects volume (0.0 - 1.0).
    pub sfx_volume: f32,
    /// Music volume (0.0 - 1.0).
    pub music_volume: f32,
    /// Mute everything.
    pub muted: bool,
    /// Mute sound effects.
    pub sfx_muted: bool,
    /// Mute music.
    pub music_muted: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            master_volume: 0.7,
            sfx_volume: 0.8,
            music_volume: 0.5,
            muted: false,
            sfx_muted: false,
            music_muted: false,
        }
    }
}

impl AudioSettings {
    /// Clamp every volume into range.
    pub fn validate(&mut self) {
        self.master_volume = clamp_volume(self.master_volume);
        self.sfx_volume = clamp_volume(self.sfx_volume);
        self.music_volume = clamp_volume(self.music_volume);
    }

    /// Parse settings, merging over defaults.
    pub fn from_json(json: &str) -> SettingsResult<Self> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.validate();
        Ok(settings)
    }

    /// Serialize settings.
    pub fn to_json(&self) -> SettingsResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check if sound effects are silenced.
    #[must_use]
    pub fn is_sfx_muted(&self) -> bool {
        self.muted || self.sfx_muted
    }

    /// Check if music is silenced.
    #[must_use]
    pub fn is_music_muted(&self) -> bool {
        self.muted || self.music_muted
    }

    /// Output level for a sound effect requested at `requested`.
    #[must_use]
    pub fn effective_sfx_volume(&self, requested: f32) -> f32 {
        clamp_volume(clamp_volume(requested) * self.sfx_volume * self.master_volume)
    }

    /// Music player volume.
    #[must_use]
    pub fn effective_music_volume(&self) -> f32 {
        clamp_volume(self.music_volume * self.master_volume)
    }

    /// Load from `store`, falling back to defaults when absent or unreadable.
    pub fn load_from(store: &dyn SettingsStore) -> Self {
        match store.load(SETTINGS_KEY) {
            Ok(Some(json)) => match Self::from_json(&json) {
                Ok(settings) => {
                    info!("Loaded audio settings");
                    settings
                },
                Err(e) => {
                    warn!("Stored audio settings are invalid, using defaults: {e}");
                    Self::default()
                },
            },
            Ok(None) => {
                info!("No stored audio settings, using defaults");
                Self::default()
            },
            Err(e) => {
                warn!("Failed to read audio settings, using defaults: {e}");
                Self::default()
            },
        }
    }

    /// Persist to `store`.
    pub fn save_to(&self, store: &dyn SettingsStore) -> SettingsResult<()> {
        store.save(SETTINGS_KEY, &self.to_json()?)?;
        debug!("Saved audio settings");
        Ok(())
    }
}

/// Partial settings update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioSettingsPatch {
    /// New master volume.
    pub master_volume: Option<f32>,
    /// New sound effects volume.
    pub sfx_volume: Option<f32>,
    /// New music volume.
    pub music_volume: Option<f32>,
    /// New global mute flag.
    pub muted: Option<bool>,
    /// New sound effects mute flag.
    pub sfx_muted: Option<bool>,
    /// New music mute flag.
    pub music_muted: Option<bool>,
}

impl AudioSettingsPatch {
    /// Set the master volume.
    #[must_use]
    pub fn with_master_volume(mut self, volume: f32) -> Self {
        self.master_volume = Some(volume);
        self
    }

    /// Set the sound effects volume.
    #[must_use]
    pub fn with_sfx_volume(mut self, volume: f32) -> Self {
        self.sfx_volume = Some(volume);
        self
    }

    /// Set the music volume.
    #[must_use]
    pub fn with_music_volume(mut self, volume: f32) -> Self {
        self.music_volume = Some(volume);
        self
    }

    /// Set the global mute flag.
    #[must_use]
    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = Some(muted);
        self
    }

    /// Set the sound effects mute flag.
    #[must_use]
    pub fn with_sfx_muted(mut self, muted: bool) -> Self {
        self.sfx_muted = Some(muted);
        self
    }

    /// Set the music mute flag.
    #[must_use]
    pub fn with_music_muted(mut self, muted: bool) -> Self {
        self.music_muted = Some(muted);
        self
    }

    /// Merge into `settings`, clamping volumes.
    pub fn apply(&self, settings: &mut AudioSettings) {
        if let Some(v) = self.master_volume {
            settings.master_volume = v;
        }
        if let Some(v) = self.sfx_volume {
            settings.sfx_volume = v;
        }
        if let Some(v) = self.music_volume {
            settings.music_volume = v;
        }
        if let Some(m) = self.muted {
            settings.muted = m;
        }
        if let Some(m) = self.sfx_muted {
            settings.sfx_muted = m;
        }
        if let Some(m) = self.music_muted {
            settings.music_muted = m;
        }
        settings.validate();
    }
}

/// Key/value persistence for settings.
pub trait SettingsStore: Send + Sync + fmt::Debug {
    /// Read the value under `key`, if any.
    fn load(&self, key: &str) -> SettingsResult<Option<String>>;

    /// Write `value` under `key`.
    fn save(&self, key: &str, value: &str) -> SettingsResult<()>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    dir: PathBuf,
}

impl FileSettingsStore {
    /// Create a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Platform config directory for SketchPlay.
    #[must_use]
    pub fn default_dir() -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from(SETTINGS_DIR_NAME),
            |dir| dir.join(SETTINGS_DIR_NAME),
        )
    }

    /// Store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Default for FileSettingsStore {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self, key: &str) -> SettingsResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> SettingsResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        fs::write(&path, value)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `key`.
    #[must_use]
    pub fn with_entry(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.lock().insert(key.into(), value.into());
        self
    }

    /// Current value under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, key: &str) -> SettingsResult<Option<String>> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> SettingsResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
