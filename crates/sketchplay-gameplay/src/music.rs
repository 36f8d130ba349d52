//! Music track descriptors.
//!
//! This module provides:
//! - `MusicTrack`: a named, playable background track
//! - `MusicOptions`: per-track level, looping and fade timings

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sketchplay_kernel::audio_backend::{clamp_volume, SoundSource};

/// Default fade duration in milliseconds.
pub const DEFAULT_FADE_MS: u64 = 1000;

/// Playback options for a music track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicOptions {
    /// Track level relative to the player volume (0.0-1.0).
    pub volume: f32,
    /// Whether the track loops.
    pub looping: bool,
    /// Fade-in duration in milliseconds.
    pub fade_in_ms: u64,
    /// Fade-out duration in milliseconds.
    pub fade_out_ms: u64,
    /// Crossfade duration in milliseconds.
    pub crossfade_ms: u64,
}

impl Default for MusicOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            looping: true,
            fade_in_ms: DEFAULT_FADE_MS,
            fade_out_ms: DEFAULT_FADE_MS,
            crossfade_ms: DEFAULT_FADE_MS,
        }
    }
}

impl MusicOptions {
    /// Set the track level.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = clamp_volume(volume);
        self
    }

    /// Set looping.
    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Set all three fade durations.
    #[must_use]
    pub fn with_fades(mut self, fade_in_ms: u64, fade_out_ms: u64, crossfade_ms: u64) -> Self {
        self.fade_in_ms = fade_in_ms;
        self.fade_out_ms = fade_out_ms;
        self.crossfade_ms = crossfade_ms;
        self
    }

    /// Fade-in duration.
    #[must_use]
    pub fn fade_in(&self) -> Duration {
        Duration::from_millis(self.fade_in_ms)
    }

    /// Fade-out duration.
    #[must_use]
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    /// Crossfade duration.
    #[must_use]
    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }
}

/// A background music track.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicTrack {
    /// Cache key.
    pub name: String,
    /// Where the track is loaded from.
    pub source: SoundSource,
    /// Playback options.
    pub options: MusicOptions,
}

impl MusicTrack {
    /// Create a track with default options.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<SoundSource>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            options: MusicOptions::default(),
        }
    }

    /// Replace the playback options.
    #[must_use]
    pub fn with_options(mut self, options: MusicOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the track level.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.options = self.options.with_volume(volume);
        self
    }
}
