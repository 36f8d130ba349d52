//! Engine configuration.
//!
//! Provides asset locations, pooling, fade timings and synthesis options.
//! Configuration can be loaded from and saved to a TOML file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sketchplay_gameplay::music::{MusicOptions, MusicTrack, DEFAULT_FADE_MS};
use sketchplay_gameplay::sound_effects::{SoundEffect, DEFAULT_POOL_SIZE};
use sketchplay_kernel::audio_silent::DEFAULT_SILENT_CLIP;
use sketchplay_kernel::synth::DEFAULT_SAMPLE_RATE;
use tracing::{info, warn};

use crate::audio_manager::AudioManagerConfig;
use crate::audio_settings::{FileSettingsStore, SETTINGS_DIR_NAME};

/// Configuration file name.
const CONFIG_FILE: &str = "sketchplay.toml";

/// Longest fade accepted, in milliseconds.
const MAX_FADE_MS: u64 = 10_000;

/// A music track listed in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicEntry {
    /// Track name.
    pub name: String,
    /// Path relative to the asset directory.
    pub path: PathBuf,
}

impl MusicEntry {
    /// Create an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Engine configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Assets ===
    /// Root of the asset tree (`sfx/`, `music/`)
    pub asset_dir: PathBuf,
    /// Where audio settings are persisted (None = platform config dir)
    pub settings_dir: Option<PathBuf>,

    // === Sound Effects ===
    /// Copies per pooled sound
    pub sound_pool_size: usize,
    /// Sounds played through reuse pools
    pub pooled_sounds: Vec<String>,
    /// Synthesize placeholders for missing effect files
    pub synth_placeholders: bool,
    /// Sample rate of synthesized placeholders
    pub sample_rate: u32,

    // === Music ===
    /// Fade-in duration in milliseconds
    pub fade_in_ms: u64,
    /// Fade-out duration in milliseconds
    pub fade_out_ms: u64,
    /// Crossfade duration in milliseconds
    pub crossfade_ms: u64,

    // === Output ===
    /// Play length reported by silent voices when no device is available
    pub silent_clip_ms: u64,

    /// Music tracks
    pub music: Vec<MusicEntry>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("assets"),
            settings_dir: None,

            sound_pool_size: DEFAULT_POOL_SIZE,
            pooled_sounds: SoundEffect::default_pooled()
                .into_iter()
                .map(|effect| effect.name().to_string())
                .collect(),
            synth_placeholders: true,
            sample_rate: DEFAULT_SAMPLE_RATE,

            fade_in_ms: DEFAULT_FADE_MS,
            fade_out_ms: DEFAULT_FADE_MS,
            crossfade_ms: DEFAULT_FADE_MS,

            silent_clip_ms: DEFAULT_SILENT_CLIP.as_millis() as u64,

            music: vec![
                MusicEntry::new("overworld", "music/overworld.mp3"),
                MusicEntry::new("underground", "music/underground.mp3"),
            ],
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default file location.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from(CONFIG_FILE),
            |dir| dir.join(SETTINGS_DIR_NAME).join(CONFIG_FILE),
        )
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        // Sound effects
        self.sound_pool_size = self.sound_pool_size.clamp(1, 16);
        self.sample_rate = self.sample_rate.clamp(8_000, 192_000);
        self.pooled_sounds.sort();
        self.pooled_sounds.dedup();

        // Music
        self.fade_in_ms = self.fade_in_ms.min(MAX_FADE_MS);
        self.fade_out_ms = self.fade_out_ms.min(MAX_FADE_MS);
        self.crossfade_ms = self.crossfade_ms.min(MAX_FADE_MS);

        // Output
        self.silent_clip_ms = self.silent_clip_ms.clamp(1, 60_000);
    }

    /// Play length of silent voices.
    #[must_use]
    pub fn silent_clip(&self) -> Duration {
        Duration::from_millis(self.silent_clip_ms)
    }

    /// Store for persisted audio settings.
    #[must_use]
    pub fn settings_store(&self) -> FileSettingsStore {
        self.settings_dir
            .as_ref()
            .map_or_else(FileSettingsStore::default, FileSettingsStore::new)
    }

    /// Tunables for the audio manager.
    #[must_use]
    pub fn manager_config(&self) -> AudioManagerConfig {
        AudioManagerConfig {
            pool_size: self.sound_pool_size,
            pooled_sounds: self.pooled_sounds.clone(),
            fade_in: Duration::from_millis(self.fade_in_ms),
            fade_out: Duration::from_millis(self.fade_out_ms),
        }
    }

    /// Configured music tracks with the configured fades.
    #[must_use]
    pub fn music_tracks(&self) -> Vec<MusicTrack> {
        let options =
            MusicOptions::default().with_fades(self.fade_in_ms, self.fade_out_ms, self.crossfade_ms);
        self.music
            .iter()
            .map(|entry| {
                MusicTrack::new(entry.name.clone(), self.asset_dir.join(&entry.path))
                    .with_options(options)
            })
            .collect()
    }
}
