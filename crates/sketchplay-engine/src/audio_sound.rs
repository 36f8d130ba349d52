//! Playable sounds.
//!
//! A [`PlayableSound`] wraps one named asset and owns its load state.
//! Loading is lazy and shared: every caller waiting on the same sound
//! awaits a single backend open. Playback failures are reported as
//! `AudioResult` values and never panic.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use sketchplay_kernel::audio_backend::{
    clamp_playback_rate, clamp_volume, AudioBackend, AudioError, AudioResult, SoundSource, Voice,
};
use tracing::{debug, warn};

use crate::audio_catalog::{SoundDefinition, SoundOptions};

type PendingLoad = Shared<BoxFuture<'static, AudioResult<Arc<dyn Voice>>>>;

/// Load progress of a sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// Not requested yet.
    Unloaded,
    /// Open in flight.
    Loading,
    /// Ready to play.
    Loaded,
    /// Open failed; the sound stays silent.
    Error,
}

/// Per-call overrides for [`PlayableSound::play`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayOverrides {
    /// Volume for this playback only.
    pub volume: Option<f32>,
    /// Playback rate for this playback only.
    pub playback_rate: Option<f32>,
}

impl PlayOverrides {
    /// Override the volume.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Override the playback rate.
    #[must_use]
    pub fn with_playback_rate(mut self, rate: f32) -> Self {
        self.playback_rate = Some(rate);
        self
    }
}

struct SoundState {
    volume: f32,
    playback_rate: f32,
    looping: bool,
    load_state: LoadState,
    voice: Option<Arc<dyn Voice>>,
    pending: Option<PendingLoad>,
    last_error: Option<AudioError>,
    disposed: bool,
}

/// One named, loadable sound.
pub struct PlayableSound {
    name: String,
    source: SoundSource,
    backend: Arc<dyn AudioBackend>,
    state: Mutex<SoundState>,
}

impl fmt::Debug for PlayableSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PlayableSound")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("load_state", &state.load_state)
            .field("volume", &state.volume)
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}

impl PlayableSound {
    /// Create an unloaded sound.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source: SoundSource,
        options: SoundOptions,
        backend: Arc<dyn AudioBackend>,
    ) -> Self {
        let options = options.clamped();
        Self {
            name: name.into(),
            source,
            backend,
            state: Mutex::new(SoundState {
                volume: options.volume,
                playback_rate: options.playback_rate,
                looping: options.looping,
                load_state: LoadState::Unloaded,
                voice: None,
                pending: None,
                last_error: None,
                disposed: false,
            }),
        }
    }

    /// Create an unloaded sound from a definition.
    #[must_use]
    pub fn from_definition(definition: &SoundDefinition, backend: Arc<dyn AudioBackend>) -> Self {
        Self::new(
            definition.name.clone(),
            definition.source.clone(),
            definition.options,
            backend,
        )
    }

    /// Load the asset.
    ///
    /// Idempotent: a loaded sound returns at once, concurrent callers share
    /// one open, and a failed sound returns its error without retrying.
    pub async fn load(&self) -> AudioResult<()> {
        let pending = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(AudioError::Disposed(self.name.clone()));
            }
            match state.load_state {
                LoadState::Loaded => return Ok(()),
                LoadState::Error => {
                    return Err(state
                        .last_error
                        .clone()
                        .unwrap_or_else(|| AudioError::NotLoaded(self.name.clone())))
                },
                LoadState::Unloaded | LoadState::Loading => {
                    if let Some(pending) = state.pending.clone() {
                        pending
                    } else {
                        debug!("Loading sound {} from {}", self.name, self.source.label());
                        let pending = self.backend.open(&self.source).shared();
                        state.pending = Some(pending.clone());
                        state.load_state = LoadState::Loading;
                        pending
                    }
                },
            }
        };

        let result = pending.await;
        self.finish_load(result)
    }

    fn finish_load(&self, result: AudioResult<Arc<dyn Voice>>) -> AudioResult<()> {
        let mut state = self.state.lock();

        if state.disposed {
            if let Ok(voice) = result {
                voice.stop();
            }
            return Err(AudioError::Disposed(self.name.clone()));
        }

        // Another waiter on the same open already settled the state.
        match state.load_state {
            LoadState::Loaded => return Ok(()),
            LoadState::Error => {
                return Err(state
                    .last_error
                    .clone()
                    .unwrap_or_else(|| AudioError::NotLoaded(self.name.clone())))
            },
            LoadState::Unloaded | LoadState::Loading => {},
        }

        state.pending = None;
        match result {
            Ok(voice) => {
                voice.set_volume(state.volume);
                voice.set_speed(state.playback_rate);
                state.voice = Some(voice);
                state.load_state = LoadState::Loaded;
                debug!("Loaded sound {}", self.name);
                Ok(())
            },
            Err(e) => {
                warn!("Failed to load sound {}: {}", self.name, e);
                state.load_state = LoadState::Error;
                state.last_error = Some(e.clone());
                Err(e)
            },
        }
    }

    /// Play from the beginning, loading first if needed.
    ///
    /// Overrides apply to this playback only. A call while already playing
    /// restarts the sound.
    pub async fn play(&self, overrides: PlayOverrides) -> AudioResult<()> {
        let needs_load = {
            let state = self.state.lock();
            if state.disposed {
                return Err(AudioError::Disposed(self.name.clone()));
            }
            match state.load_state {
                LoadState::Error => {
                    warn!("Sound {} failed to load, skipping playback", self.name);
                    return Err(AudioError::NotLoaded(self.name.clone()));
                },
                LoadState::Loaded => false,
                LoadState::Unloaded | LoadState::Loading => true,
            }
        };

        if needs_load {
            self.load().await.map_err(|e| match e {
                AudioError::Disposed(name) => AudioError::Disposed(name),
                _ => AudioError::NotLoaded(self.name.clone()),
            })?;
        }

        let (voice, volume, rate, looping) = {
            let state = self.state.lock();
            if state.disposed {
                return Err(AudioError::Disposed(self.name.clone()));
            }
            let voice = state
                .voice
                .clone()
                .ok_or_else(|| AudioError::NotLoaded(self.name.clone()))?;
            (voice, state.volume, state.playback_rate, state.looping)
        };

        let volume = clamp_volume(overrides.volume.unwrap_or(volume));
        let rate = clamp_playback_rate(overrides.playback_rate.unwrap_or(rate));
        voice.set_volume(volume);
        voice.set_speed(rate);
        voice.start(looping)?;

        debug!("Playing {} (volume {:.2}, rate {:.2})", self.name, volume, rate);
        Ok(())
    }

    fn live_voice(&self) -> Option<Arc<dyn Voice>> {
        let state = self.state.lock();
        if state.disposed {
            return None;
        }
        state.voice.clone()
    }

    /// Halt playback and rewind.
    pub fn stop(&self) {
        if let Some(voice) = self.live_voice() {
            voice.stop();
        }
    }

    /// Pause playback.
    pub fn pause(&self) {
        if let Some(voice) = self.live_voice() {
            voice.pause();
        }
    }

    /// Resume paused playback.
    pub fn resume(&self) {
        if let Some(voice) = self.live_voice() {
            if let Err(e) = voice.resume() {
                warn!("Failed to resume {}: {}", self.name, e);
            }
        }
    }

    /// Set the stored volume (clamped) and apply it to live output.
    pub fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        let voice = {
            let mut state = self.state.lock();
            state.volume = volume;
            state.voice.clone().filter(|_| !state.disposed)
        };
        if let Some(voice) = voice {
            voice.set_volume(volume);
        }
    }

    /// Set the stored playback rate (clamped) and apply it to live output.
    pub fn set_playback_rate(&self, rate: f32) {
        let rate = clamp_playback_rate(rate);
        let voice = {
            let mut state = self.state.lock();
            state.playback_rate = rate;
            state.voice.clone().filter(|_| !state.disposed)
        };
        if let Some(voice) = voice {
            voice.set_speed(rate);
        }
    }

    /// New independent, unloaded sound with the same source and options.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self::new(
            self.name.clone(),
            self.source.clone(),
            self.options(),
            Arc::clone(&self.backend),
        )
    }

    /// Stop and release the voice. Later calls are refused.
    pub fn dispose(&self) {
        let voice = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.pending = None;
            state.voice.take()
        };
        if let Some(voice) = voice {
            voice.stop();
        }
        debug!("Disposed sound {}", self.name);
    }

    /// Sound name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asset source.
    #[must_use]
    pub fn source(&self) -> &SoundSource {
        &self.source
    }

    /// Current stored options.
    #[must_use]
    pub fn options(&self) -> SoundOptions {
        let state = self.state.lock();
        SoundOptions {
            volume: state.volume,
            looping: state.looping,
            playback_rate: state.playback_rate,
        }
    }

    /// Stored volume.
    #[must_use]
    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Stored playback rate.
    #[must_use]
    pub fn playback_rate(&self) -> f32 {
        self.state.lock().playback_rate
    }

    /// Check if playback loops.
    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.state.lock().looping
    }

    /// Load progress.
    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.state.lock().load_state
    }

    /// Check if the sound is ready to play.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.load_state() == LoadState::Loaded
    }

    /// Check if loading failed.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.load_state() == LoadState::Error
    }

    /// Check if the sound is audibly playing.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.live_voice().is_some_and(|voice| voice.is_playing())
    }

    /// Check if the sound was disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketchplay_kernel::audio_silent::SilentBackend;
    use std::time::Duration;

    fn sound_with(backend: &Arc<SilentBackend>, name: &str, options: SoundOptions) -> PlayableSound {
        let dyn_backend: Arc<dyn AudioBackend> = backend.clone();
        PlayableSound::new(
            name,
            SoundSource::from(format!("sfx/{name}.mp3")),
            options,
            dyn_backend,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_share_one_open() {
        let backend =
            Arc::new(SilentBackend::new().with_load_delay(Duration::from_millis(100)));
        let sound = sound_with(&backend, "coin", SoundOptions::default());

        let (a, b, c) = tokio::join!(sound.load(), sound.load(), sound.load());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(backend.open_count("sfx/coin.mp3"), 1);
        assert!(sound.is_loaded());

        sound.load().await.expect("reload is a no-op");
        assert_eq!(backend.open_count("sfx/coin.mp3"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_is_sticky() {
        let backend = Arc::new(SilentBackend::new().with_missing("sfx/pipe.mp3"));
        let sound = sound_with(&backend, "pipe", SoundOptions::default());

        assert!(matches!(
            sound.load().await,
            Err(AudioError::LoadFailed { .. })
        ));
        assert!(sound.has_error());

        let result = sound.play(PlayOverrides::default()).await;
        assert_eq!(result, Err(AudioError::NotLoaded("pipe".to_string())));
        assert_eq!(backend.open_count("sfx/pipe.mp3"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_loads_first() {
        let backend = Arc::new(SilentBackend::new().with_clip_length(None));
        let sound = sound_with(&backend, "jump", SoundOptions::default());

        sound.play(PlayOverrides::default()).await.expect("play");
        assert!(sound.is_loaded());
        assert!(sound.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_overrides_do_not_change_stored_values() {
        let backend = Arc::new(SilentBackend::new());
        let sound = sound_with(&backend, "land", SoundOptions::default().with_volume(0.4));

        sound
            .play(PlayOverrides::default().with_volume(0.9).with_playback_rate(2.0))
            .await
            .expect("play");

        let voice = &backend.voices_for("sfx/land.mp3")[0];
        assert_eq!(voice.volume(), 0.9);
        assert_eq!(voice.speed(), 2.0);
        assert_eq!(sound.volume(), 0.4);
        assert_eq!(sound.playback_rate(), 1.0);

        sound.play(PlayOverrides::default()).await.expect("play");
        assert_eq!(voice.volume(), 0.4);
        assert_eq!(voice.speed(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_restarts() {
        let backend = Arc::new(SilentBackend::new());
        let sound = sound_with(&backend, "coin", SoundOptions::default());

        sound.play(PlayOverrides::default()).await.expect("play");
        sound.play(PlayOverrides::default()).await.expect("play");

        let voices = backend.voices_for("sfx/coin.mp3");
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].start_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_volume_clamps_and_applies() {
        let backend = Arc::new(SilentBackend::new());
        let sound = sound_with(&backend, "pause", SoundOptions::default());
        sound.load().await.expect("load");

        sound.set_volume(1.7);
        assert_eq!(sound.volume(), 1.0);
        sound.set_volume(-0.3);
        assert_eq!(sound.volume(), 0.0);
        sound.set_playback_rate(0.1);
        assert_eq!(sound.playback_rate(), 0.25);

        let voice = &backend.voices_for("sfx/pause.mp3")[0];
        assert_eq!(voice.volume(), 0.0);
        assert_eq!(voice.speed(), 0.25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let backend = Arc::new(SilentBackend::new().with_clip_length(None));
        let sound = sound_with(&backend, "level_start", SoundOptions::default());
        sound.play(PlayOverrides::default()).await.expect("play");

        sound.pause();
        assert!(!sound.is_playing());
        sound.resume();
        assert!(sound.is_playing());
        sound.stop();
        assert!(!sound.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_is_independent() {
        let backend = Arc::new(SilentBackend::new());
        let original = sound_with(
            &backend,
            "coin",
            SoundOptions::default().with_volume(0.5).with_looping(true),
        );
        original.load().await.expect("load");

        let copy = original.duplicate();
        assert_eq!(copy.name(), "coin");
        assert_eq!(copy.load_state(), LoadState::Unloaded);
        assert!(copy.is_looping());
        assert_eq!(copy.volume(), 0.5);

        copy.load().await.expect("load");
        assert_eq!(backend.open_count("sfx/coin.mp3"), 2);

        copy.set_volume(0.1);
        assert_eq!(original.volume(), 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_refuses_further_use() {
        let backend = Arc::new(SilentBackend::new().with_clip_length(None));
        let sound = sound_with(&backend, "death", SoundOptions::default());
        sound.play(PlayOverrides::default()).await.expect("play");

        sound.dispose();
        sound.dispose();
        assert!(sound.is_disposed());
        assert!(!sound.is_playing());
        assert!(!backend.voices_for("sfx/death.mp3")[0].is_playing());

        assert_eq!(
            sound.play(PlayOverrides::default()).await,
            Err(AudioError::Disposed("death".to_string()))
        );
        sound.stop();
        sound.resume();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_during_load() {
        let backend =
            Arc::new(SilentBackend::new().with_load_delay(Duration::from_millis(50)));
        let sound = Arc::new(sound_with(&backend, "pipe", SoundOptions::default()));

        let loader = {
            let sound = Arc::clone(&sound);
            tokio::spawn(async move { sound.load().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        sound.dispose();

        let result = loader.await.expect("task");
        assert_eq!(result, Err(AudioError::Disposed("pipe".to_string())));
        assert!(!sound.is_loaded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_is_reported() {
        let backend = Arc::new(SilentBackend::new().with_rejected("sfx/menu_select.mp3"));
        let sound = sound_with(&backend, "menu_select", SoundOptions::default());

        let result = sound.play(PlayOverrides::default()).await;
        assert!(matches!(result, Err(AudioError::PlaybackFailed { .. })));
        assert!(sound.is_loaded());
    }
}
