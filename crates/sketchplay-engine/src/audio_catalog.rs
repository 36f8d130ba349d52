//! Sound definitions and the reference catalog.
//!
//! This module provides:
//! - `SoundOptions` / `SoundDefinition`: what the manager loads
//! - `reference_catalog`: the 17 game effects under an asset directory,
//!   with synthesized stand-ins for effects whose files are missing

use std::path::Path;

use sketchplay_gameplay::sound_effects::SoundEffect;
use sketchplay_kernel::audio_backend::{clamp_playback_rate, clamp_volume, SoundSource};
use sketchplay_kernel::synth::ToneSynth;
use tracing::{debug, info};

/// Default playback options of a sound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundOptions {
    /// Stored volume (0.0-1.0).
    pub volume: f32,
    /// Whether playback loops.
    pub looping: bool,
    /// Playback rate (0.25-4.0).
    pub playback_rate: f32,
}

impl Default for SoundOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            looping: false,
            playback_rate: 1.0,
        }
    }
}

impl SoundOptions {
    /// Set the volume.
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

    /// Set the playback rate.
    #[must_use]
    pub fn with_playback_rate(mut self, rate: f32) -> Self {
        self.playback_rate = clamp_playback_rate(rate);
        self
    }

    /// Copy with every value clamped into range.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            volume: clamp_volume(self.volume),
            looping: self.looping,
            playback_rate: clamp_playback_rate(self.playback_rate),
        }
    }
}

/// A named sound the manager loads.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundDefinition {
    /// Unique name.
    pub name: String,
    /// Where the asset comes from.
    pub source: SoundSource,
    /// Default playback options.
    pub options: SoundOptions,
}

impl SoundDefinition {
    /// Create a definition with default options.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<SoundSource>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            options: SoundOptions::default(),
        }
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: SoundOptions) -> Self {
        self.options = options.clamped();
        self
    }

    /// Set the default volume.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.options = self.options.with_volume(volume);
        self
    }
}

/// Build the game's effect catalog rooted at `asset_dir`.
///
/// With a synth, effects whose asset file is missing and that have a
/// generator are replaced by synthesized placeholders.
#[must_use]
pub fn reference_catalog(asset_dir: &Path, synth: Option<&ToneSynth>) -> Vec<SoundDefinition> {
    let mut synthesized = 0usize;

    let catalog: Vec<SoundDefinition> = SoundEffect::all()
        .into_iter()
        .map(|effect| {
            let path = effect.asset_path(asset_dir);
            let placeholder = synth
                .filter(|_| !path.exists())
                .and_then(|synth| effect.placeholder(synth));

            let source = match placeholder {
                Some(sound) => {
                    synthesized += 1;
                    debug!("Using synthesized {} ({} missing)", effect, path.display());
                    sound.source()
                },
                None => SoundSource::File(path),
            };

            SoundDefinition::new(effect.name(), source).with_volume(effect.default_volume())
        })
        .collect();

    info!(
        "Built sound catalog: {} effects, {} synthesized",
        catalog.len(),
        synthesized
    );
    catalog
}
