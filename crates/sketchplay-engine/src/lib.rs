//! SketchPlay Engine - audio coordination for sketch-built games.
//!
//! This crate ties the audio layers together:
//! - Fade ramps and their tokio scheduler
//! - Playable sounds, reuse pools and the music player
//! - Persisted audio settings
//! - The `AudioManager` context object gameplay talks to
//! - Engine configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod audio_catalog;
pub mod audio_manager;
pub mod audio_settings;
pub mod audio_sound;
pub mod config;
pub mod fade;
pub mod music_player;
pub mod sound_pool;

pub use audio_catalog::{reference_catalog, SoundDefinition, SoundOptions};
pub use audio_manager::{
    AudioManager, AudioManagerConfig, PlayOutcome, SoundRequest, SoundResolution,
};
pub use audio_settings::{
    AudioSettings, AudioSettingsPatch, FileSettingsStore, MemorySettingsStore, SettingsError,
    SettingsStore,
};
pub use audio_sound::{LoadState, PlayOverrides, PlayableSound};
pub use config::EngineConfig;
pub use fade::{FadeRamp, FADE_STEPS};
pub use music_player::{MusicPlayer, MusicState};
pub use sound_pool::SoundPool;
