//! Background music playback.
//!
//! This module provides:
//! - A track cache keyed by name (fresh tracks start at volume 0)
//! - Fade-in, fade-out and crossfade ramps driven by tokio tasks
//! - Player volume and mute that never stop transport
//!
//! At most one track is current. A crossfade keeps the old track current
//! until both of its ramps have finished, then promotes the new one.
//!
//! # Example
//!
//! ```ignore
//! let player = MusicPlayer::new(backend);
//! player.play(&MusicTrack::new("overworld", "assets/music/overworld.mp3")).await?;
//! player.play(&MusicTrack::new("castle", "assets/music/castle.mp3")).await?; // crossfades
//! player.stop(Duration::from_secs(1)).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use sketchplay_gameplay::music::{MusicOptions, MusicTrack};
use sketchplay_kernel::audio_backend::{
    clamp_volume, AudioBackend, AudioError, AudioResult, Voice,
};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::fade::{self, FadeRamp};

const PLAYER_NAME: &str = "music player";

type PendingTrack = Shared<BoxFuture<'static, AudioResult<Arc<dyn Voice>>>>;

/// Playback state of the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MusicState {
    /// No current track.
    NoTrack,
    /// Current track is playing.
    Playing,
    /// Current track is paused.
    Paused,
}

/// A track with its opened voice.
#[derive(Debug)]
struct LoadedTrack {
    track: MusicTrack,
    voice: Arc<dyn Voice>,
}

impl LoadedTrack {
    fn name(&self) -> &str {
        &self.track.name
    }
}

#[derive(Debug)]
struct RampEntry {
    track: String,
    abort: AbortHandle,
}

#[derive(Debug)]
struct Crossfade {
    token: u64,
    target: Arc<LoadedTrack>,
}

struct PlayerState {
    volume: f32,
    muted: bool,
    current: Option<Arc<LoadedTrack>>,
    paused: bool,
    pausing: Option<u64>,
    crossfade: Option<Crossfade>,
    cache: HashMap<String, Arc<LoadedTrack>>,
    loading: HashMap<String, PendingTrack>,
    ramps: HashMap<u64, RampEntry>,
    next_id: u64,
    disposed: bool,
}

impl PlayerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn level_for(&self, track: &MusicTrack) -> f32 {
        if self.muted {
            0.0
        } else {
            clamp_volume(self.volume * track.options.volume)
        }
    }

    /// Paused or fading out towards a pause.
    fn is_pausing(&self) -> bool {
        self.paused || self.pausing.is_some()
    }

    fn abort_ramps_for(&mut self, track: &str) {
        self.ramps.retain(|_, entry| {
            if entry.track == track {
                entry.abort.abort();
                false
            } else {
                true
            }
        });
    }
}

/// Plays one background track at a time with fades.
pub struct MusicPlayer {
    backend: Arc<dyn AudioBackend>,
    state: Arc<Mutex<PlayerState>>,
}

impl fmt::Debug for MusicPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MusicPlayer")
            .field("backend", &self.backend.name())
            .field("current", &state.current.as_ref().map(|t| t.name().to_string()))
            .field("volume", &state.volume)
            .field("muted", &state.muted)
            .field("ramps", &state.ramps.len())
            .finish_non_exhaustive()
    }
}

impl MusicPlayer {
    /// Create a player with full volume and no track.
    #[must_use]
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(PlayerState {
                volume: 1.0,
                muted: false,
                current: None,
                paused: false,
                pausing: None,
                crossfade: None,
                cache: HashMap::new(),
                loading: HashMap::new(),
                ramps: HashMap::new(),
                next_id: 0,
                disposed: false,
            })),
        }
    }

    fn disposed_error() -> AudioError {
        AudioError::Disposed(PLAYER_NAME.to_string())
    }

    /// Load `track` into the cache, or return the cached copy.
    ///
    /// A freshly loaded track starts at volume 0.
    async fn load(&self, track: &MusicTrack) -> AudioResult<Arc<LoadedTrack>> {
        let pending = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(Self::disposed_error());
            }
            if let Some(loaded) = state.cache.get(&track.name) {
                return Ok(Arc::clone(loaded));
            }
            if let Some(pending) = state.loading.get(&track.name) {
                pending.clone()
            } else {
                debug!("Loading track {} from {}", track.name, track.source.label());
                let pending = self.backend.open(&track.source).shared();
                state.loading.insert(track.name.clone(), pending.clone());
                pending
            }
        };

        let result = pending.await;

        let mut state = self.state.lock();
        state.loading.remove(&track.name);
        if state.disposed {
            if let Ok(voice) = result {
                voice.stop();
            }
            return Err(Self::disposed_error());
        }
        if let Some(loaded) = state.cache.get(&track.name) {
            return Ok(Arc::clone(loaded));
        }

        let voice = result.map_err(|e| {
            warn!("Failed to load track {}: {}", track.name, e);
            e
        })?;
        voice.set_volume(0.0);
        let loaded = Arc::new(LoadedTrack {
            track: track.clone(),
            voice,
        });
        state.cache.insert(track.name.clone(), Arc::clone(&loaded));
        info!("Loaded track {}", track.name);
        Ok(loaded)
    }

    /// Load `track` into the cache without playing it.
    pub async fn load_track(&self, track: &MusicTrack) -> AudioResult<()> {
        self.load(track).await.map(|_| ())
    }

    /// Spawn a ramp on `loaded`, replacing any ramp already running on it.
    fn spawn_ramp(&self, loaded: &Arc<LoadedTrack>, ramp: FadeRamp) -> AudioResult<JoinHandle<()>> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(Self::disposed_error());
        }
        state.abort_ramps_for(loaded.name());

        let id = state.next_id();
        let shared = Arc::clone(&self.state);
        let voice = Arc::clone(&loaded.voice);
        let handle = tokio::spawn(async move {
            let writer = Arc::clone(&shared);
            fade::drive(ramp, move |level| {
                // Muting wins over any ramp in flight.
                if !writer.lock().muted {
                    voice.set_volume(level);
                }
            })
            .await;
            shared.lock().ramps.remove(&id);
        });

        state.ramps.insert(
            id,
            RampEntry {
                track: loaded.name().to_string(),
                abort: handle.abort_handle(),
            },
        );
        Ok(handle)
    }

    /// Ramp `loaded` from `start` to `target`. Returns `false` when a newer
    /// operation replaced the ramp before it finished.
    async fn fade(
        &self,
        loaded: &Arc<LoadedTrack>,
        start: f32,
        target: f32,
        duration: Duration,
    ) -> AudioResult<bool> {
        let ramp = FadeRamp::new(start, target, duration);
        if ramp.is_instant() {
            self.state.lock().abort_ramps_for(loaded.name());
            loaded.voice.set_volume(target);
            return Ok(true);
        }

        debug!(
            "Fading {} {:.2} -> {:.2} over {}ms",
            loaded.name(),
            ramp.start(),
            ramp.target(),
            duration.as_millis()
        );
        let completed = self.spawn_ramp(loaded, ramp)?.await.is_ok();
        if self.state.lock().disposed {
            return Err(Self::disposed_error());
        }
        Ok(completed)
    }

    /// Play `track`.
    ///
    /// With no current track it fades in. With a different current track it
    /// crossfades. With the same track it fades in again, restarting
    /// transport if the track was stopped or paused.
    pub async fn play(&self, track: &MusicTrack) -> AudioResult<()> {
        let loaded = self.load(track).await?;
        let current = self.state.lock().current.clone();

        match current {
            Some(current) if current.name() == loaded.name() => self.retrigger(&current).await,
            Some(current) => {
                let duration = loaded.track.options.crossfade();
                self.crossfade(current, loaded, duration).await
            },
            None => self.start_fresh(loaded).await,
        }
    }

    async fn start_fresh(&self, loaded: Arc<LoadedTrack>) -> AudioResult<()> {
        loaded.voice.set_volume(0.0);
        loaded.voice.start(loaded.track.options.looping)?;

        let target = {
            let mut state = self.state.lock();
            if state.disposed {
                drop(state);
                loaded.voice.stop();
                return Err(Self::disposed_error());
            }
            state.current = Some(Arc::clone(&loaded));
            state.paused = false;
            state.level_for(&loaded.track)
        };

        info!("Playing track {}", loaded.name());
        self.fade(&loaded, 0.0, target, loaded.track.options.fade_in())
            .await
            .map(|_| ())
    }

    async fn retrigger(&self, current: &Arc<LoadedTrack>) -> AudioResult<()> {
        let (paused, target) = {
            let state = self.state.lock();
            (state.paused, state.level_for(&current.track))
        };

        if paused {
            current.voice.resume()?;
        } else if !current.voice.is_playing() {
            current.voice.set_volume(0.0);
            current.voice.start(current.track.options.looping)?;
        }
        {
            let mut state = self.state.lock();
            state.paused = false;
            state.pausing = None;
        }

        debug!("Retriggering track {}", current.name());
        let start = if self.is_muted() { 0.0 } else { current.voice.volume() };
        self.fade(current, start, target, current.track.options.fade_in())
            .await
            .map(|_| ())
    }

    /// Fade `from` out while `to` fades in, then make `to` current.
    async fn crossfade(
        &self,
        from: Arc<LoadedTrack>,
        to: Arc<LoadedTrack>,
        duration: Duration,
    ) -> AudioResult<()> {
        // A start failure leaves the old track untouched.
        to.voice.set_volume(0.0);
        to.voice.start(to.track.options.looping)?;

        let (token, target, replaced) = {
            let mut state = self.state.lock();
            if state.disposed {
                drop(state);
                to.voice.stop();
                return Err(Self::disposed_error());
            }
            let token = state.next_id();
            let replaced = state
                .crossfade
                .replace(Crossfade {
                    token,
                    target: Arc::clone(&to),
                })
                .map(|previous| previous.target)
                .filter(|previous| previous.name() != to.name());
            if let Some(previous) = &replaced {
                state.abort_ramps_for(previous.name());
            }
            (token, state.level_for(&to.track), replaced)
        };

        if let Some(previous) = replaced {
            debug!("Dropping crossfade target {}", previous.name());
            previous.voice.stop();
        }

        info!(
            "Crossfading {} -> {} over {}ms",
            from.name(),
            to.name(),
            duration.as_millis()
        );

        let from_level = from.voice.volume();
        let (fade_out, fade_in) = tokio::join!(
            self.fade(&from, from_level, 0.0, duration),
            self.fade(&to, 0.0, target, duration)
        );

        let mut state = self.state.lock();
        if state.disposed {
            drop(state);
            to.voice.stop();
            return Err(Self::disposed_error());
        }
        if state.crossfade.as_ref().map(|c| c.token) != Some(token) {
            debug!("Crossfade to {} superseded", to.name());
            return Ok(());
        }
        state.crossfade = None;

        if !matches!((&fade_out, &fade_in), (Ok(true), Ok(true))) {
            drop(state);
            debug!("Crossfade to {} interrupted", to.name());
            to.voice.stop();
            fade_out?;
            fade_in?;
            return Ok(());
        }

        from.voice.stop();
        state.current = Some(Arc::clone(&to));
        state.paused = false;
        debug!("Crossfade complete, current track {}", to.name());
        Ok(())
    }

    /// Stop the current track, fading out over `fade_out` unless muted.
    pub async fn stop(&self, fade_out: Duration) -> AudioResult<()> {
        let (current, crossfade, muted) = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(Self::disposed_error());
            }
            state.paused = false;
            state.pausing = None;
            let crossfade = state.crossfade.take();
            if let Some(crossfade) = &crossfade {
                state.abort_ramps_for(crossfade.target.name());
            }
            (state.current.take(), crossfade, state.muted)
        };

        if let Some(crossfade) = crossfade {
            crossfade.target.voice.stop();
        }

        let Some(current) = current else {
            debug!("Stop requested with no current track");
            return Ok(());
        };

        info!("Stopping track {}", current.name());
        if muted {
            self.state.lock().abort_ramps_for(current.name());
            current.voice.stop();
            return Ok(());
        }

        if self.fade(&current, current.voice.volume(), 0.0, fade_out).await? {
            current.voice.stop();
        }
        Ok(())
    }

    /// Pause the current track, fading out over `fade_out` unless muted.
    ///
    /// A `resume` issued while the fade-out runs cancels the pause.
    pub async fn pause(&self, fade_out: Duration) -> AudioResult<()> {
        let (current, muted, token) = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(Self::disposed_error());
            }
            if state.paused {
                return Ok(());
            }
            let Some(current) = state.current.clone() else {
                debug!("Pause requested with no current track");
                return Ok(());
            };
            let token = state.next_id();
            state.pausing = Some(token);
            (current, state.muted, token)
        };

        let completed = if muted {
            true
        } else {
            self.fade(&current, current.voice.volume(), 0.0, fade_out).await?
        };

        let mut state = self.state.lock();
        if state.pausing != Some(token) {
            debug!("Pause of {} cancelled", current.name());
            return Ok(());
        }
        state.pausing = None;
        if completed && state.current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &current)) {
            current.voice.pause();
            state.paused = true;
            debug!("Paused track {}", current.name());
        }
        Ok(())
    }

    /// Resume a paused track, fading in over `fade_in` unless muted.
    ///
    /// A track still fading out towards a pause fades back in from its
    /// current level instead.
    pub async fn resume(&self, fade_in: Duration) -> AudioResult<()> {
        let (current, target, muted, was_paused) = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(Self::disposed_error());
            }
            let Some(current) = state.current.clone() else {
                return Ok(());
            };
            if !state.is_pausing() {
                return Ok(());
            }
            if state.pausing.take().is_some() {
                state.abort_ramps_for(current.name());
            }
            let target = state.level_for(&current.track);
            (current, target, state.muted, state.paused)
        };

        let start = if was_paused {
            // Paused voices rejoin under fade-in control.
            current.voice.set_volume(0.0);
            current.voice.resume()?;
            0.0
        } else {
            current.voice.volume()
        };
        self.state.lock().paused = false;
        debug!("Resumed track {}", current.name());

        if muted {
            current.voice.set_volume(0.0);
            return Ok(());
        }
        self.fade(&current, start, target, fade_in).await.map(|_| ())
    }

    /// Set the player volume (clamped), applied now unless muted or paused.
    pub fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        let mut state = self.state.lock();
        state.volume = volume;
        if state.disposed || state.muted || state.is_pausing() {
            return;
        }
        if let Some(current) = &state.current {
            current.voice.set_volume(state.level_for(&current.track));
        }
    }

    /// Silence or restore the current track without stopping transport.
    pub fn set_muted(&self, muted: bool) {
        let mut state = self.state.lock();
        state.muted = muted;
        if state.disposed {
            return;
        }
        // Unmuting a paused track leaves the level to `resume`.
        if let Some(current) = &state.current {
            if muted || !state.is_pausing() {
                current.voice.set_volume(state.level_for(&current.track));
            }
        }
        if muted {
            if let Some(crossfade) = &state.crossfade {
                crossfade.target.voice.set_volume(0.0);
            }
        }
    }

    /// Abort every ramp, stop every cached track and refuse later calls.
    pub fn dispose(&self) {
        let voices: Vec<Arc<LoadedTrack>> = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            for (_, entry) in state.ramps.drain() {
                entry.abort.abort();
            }
            state.current = None;
            state.crossfade = None;
            state.paused = false;
            state.pausing = None;
            state.loading.clear();
            state.cache.drain().map(|(_, loaded)| loaded).collect()
        };

        for loaded in &voices {
            loaded.voice.stop();
        }
        info!("Music player disposed ({} tracks released)", voices.len());
    }

    /// Name of the current track.
    #[must_use]
    pub fn current_track(&self) -> Option<String> {
        self.state
            .lock()
            .current
            .as_ref()
            .map(|current| current.name().to_string())
    }

    /// Options of the current track.
    #[must_use]
    pub fn current_options(&self) -> Option<MusicOptions> {
        self.state
            .lock()
            .current
            .as_ref()
            .map(|current| current.track.options)
    }

    /// Name of the track being crossfaded in.
    #[must_use]
    pub fn crossfade_target(&self) -> Option<String> {
        self.state
            .lock()
            .crossfade
            .as_ref()
            .map(|crossfade| crossfade.target.name().to_string())
    }

    /// Playback state.
    #[must_use]
    pub fn state(&self) -> MusicState {
        let state = self.state.lock();
        match (&state.current, state.paused) {
            (None, _) => MusicState::NoTrack,
            (Some(_), true) => MusicState::Paused,
            (Some(_), false) => MusicState::Playing,
        }
    }

    /// Check if a current track is playing.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state() == MusicState::Playing
    }

    /// Output level of the current track's voice.
    #[must_use]
    pub fn current_level(&self) -> Option<f32> {
        self.state
            .lock()
            .current
            .as_ref()
            .map(|current| current.voice.volume())
    }

    /// Player volume.
    #[must_use]
    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Check if the player is muted.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    /// Number of ramps still running.
    #[must_use]
    pub fn active_ramps(&self) -> usize {
        self.state.lock().ramps.len()
    }

    /// Check if a track is cached.
    #[must_use]
    pub fn is_cached(&self, name: &str) -> bool {
        self.state.lock().cache.contains_key(name)
    }

    /// Check if the player was disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketchplay_kernel::audio_silent::SilentBackend;

    fn player(backend: &Arc<SilentBackend>) -> Arc<MusicPlayer> {
        let dyn_backend: Arc<dyn AudioBackend> = backend.clone();
        Arc::new(MusicPlayer::new(dyn_backend))
    }

    fn track(name: &str) -> MusicTrack {
        MusicTrack::new(name, format!("music/{name}.mp3"))
    }

    fn looping_backend() -> Arc<SilentBackend> {
        Arc::new(SilentBackend::new().with_clip_length(None))
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_track_caches_at_zero_volume() {
        let backend = looping_backend();
        let player = player(&backend);
        let overworld = track("overworld");

        player.load_track(&overworld).await.expect("load");
        player.load_track(&overworld).await.expect("load");

        assert!(player.is_cached("overworld"));
        assert_eq!(backend.open_count("music/overworld.mp3"), 1);
        assert_eq!(backend.voices()[0].volume(), 0.0);
        assert_eq!(player.state(), MusicState::NoTrack);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_fades_in_to_target() {
        let backend = looping_backend();
        let player = player(&backend);
        player.set_volume(0.7);

        player.play(&track("overworld")).await.expect("play");

        let voice = &backend.voices_for("music/overworld.mp3")[0];
        let history = voice.volume_history();
        assert!(history.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(voice.volume(), 0.7);
        assert_eq!(player.current_track().as_deref(), Some("overworld"));
        assert!(player.is_playing());
        assert_eq!(player.active_ramps(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_level_includes_track_volume() {
        let backend = looping_backend();
        let player = player(&backend);
        player.set_volume(0.5);

        player
            .play(&track("castle").with_volume(0.6))
            .await
            .expect("play");

        assert!((player.current_level().unwrap_or_default() - 0.3).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fade_in_takes_its_duration() {
        let backend = looping_backend();
        let player = player(&backend);
        let quick = track("menu").with_options(MusicOptions::default().with_fades(300, 300, 300));

        let started = tokio::time::Instant::now();
        player.play(&quick).await.expect("play");
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_crossfade_promotes_only_after_both_ramps() {
        let backend = looping_backend();
        let player = player(&backend);
        player.play(&track("overworld")).await.expect("play");

        let task = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.play(&track("castle")).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(player.current_track().as_deref(), Some("overworld"));
        assert_eq!(player.crossfade_target().as_deref(), Some("castle"));
        assert_eq!(player.active_ramps(), 2);

        task.await.expect("task").expect("crossfade");

        assert_eq!(player.current_track().as_deref(), Some("castle"));
        assert_eq!(player.crossfade_target(), None);
        let old = &backend.voices_for("music/overworld.mp3")[0];
        let new = &backend.voices_for("music/castle.mp3")[0];
        assert!(!old.is_playing());
        assert_eq!(old.volume(), 0.0);
        assert!(new.is_playing());
        assert_eq!(new.volume(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crossfade_start_failure_keeps_old_track() {
        let backend = Arc::new(
            SilentBackend::new()
                .with_clip_length(None)
                .with_rejected("music/broken.mp3"),
        );
        let player = player(&backend);
        player.play(&track("overworld")).await.expect("play");

        let result = player.play(&track("broken")).await;
        assert!(matches!(result, Err(AudioError::PlaybackFailed { .. })));

        assert_eq!(player.current_track().as_deref(), Some("overworld"));
        assert_eq!(player.current_level(), Some(1.0));
        assert!(backend.voices_for("music/overworld.mp3")[0].is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaying_current_track_fades_again() {
        let backend = looping_backend();
        let player = player(&backend);
        let overworld = track("overworld");
        player.play(&overworld).await.expect("play");
        player.play(&overworld).await.expect("play");

        let voices = backend.voices_for("music/overworld.mp3");
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].start_count(), 1);
        assert_eq!(player.current_track().as_deref(), Some("overworld"));
        assert_eq!(player.crossfade_target(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_is_idempotent() {
        let backend = looping_backend();
        let player = player(&backend);
        player.set_volume(0.6);
        player.play(&track("overworld")).await.expect("play");

        player.set_muted(true);
        assert_eq!(player.current_level(), Some(0.0));
        player.set_muted(true);
        assert_eq!(player.current_level(), Some(0.0));
        assert!(player.is_playing());

        player.set_muted(false);
        assert_eq!(player.current_level(), Some(0.6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_volume_while_muted_applies_on_unmute() {
        let backend = looping_backend();
        let player = player(&backend);
        player.play(&track("overworld")).await.expect("play");

        player.set_muted(true);
        player.set_volume(0.25);
        assert_eq!(player.current_level(), Some(0.0));
        player.set_muted(false);
        assert_eq!(player.current_level(), Some(0.25));

        player.set_volume(3.0);
        assert_eq!(player.volume(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_fades_out() {
        let backend = looping_backend();
        let player = player(&backend);
        player.play(&track("overworld")).await.expect("play");

        player.stop(Duration::from_millis(600)).await.expect("stop");

        let voice = &backend.voices_for("music/overworld.mp3")[0];
        assert!(!voice.is_playing());
        assert_eq!(voice.volume(), 0.0);
        assert_eq!(player.state(), MusicState::NoTrack);
        assert!(player.is_cached("overworld"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_fade_is_immediate() {
        let backend = looping_backend();
        let player = player(&backend);
        player.play(&track("overworld")).await.expect("play");

        let started = tokio::time::Instant::now();
        player.stop(Duration::ZERO).await.expect("stop");
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(!backend.voices()[0].is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let backend = looping_backend();
        let player = player(&backend);
        player.set_volume(0.8);
        player.play(&track("overworld")).await.expect("play");

        player.pause(Duration::from_millis(300)).await.expect("pause");
        assert_eq!(player.state(), MusicState::Paused);
        assert!(backend.voices()[0].is_paused());

        player.resume(Duration::from_millis(300)).await.expect("resume");
        assert_eq!(player.state(), MusicState::Playing);
        assert_eq!(player.current_level(), Some(0.8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_with_no_track_is_noop() {
        let backend = looping_backend();
        let player = player(&backend);
        player.stop(Duration::from_secs(1)).await.expect("stop");
        player.pause(Duration::from_secs(1)).await.expect("pause");
        player.resume(Duration::from_secs(1)).await.expect("resume");
        assert_eq!(player.state(), MusicState::NoTrack);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure() {
        let backend = Arc::new(SilentBackend::new().with_missing("music/missing.mp3"));
        let player = player(&backend);

        let result = player.play(&track("missing")).await;
        assert!(matches!(result, Err(AudioError::LoadFailed { .. })));
        assert!(!player.is_cached("missing"));
        assert_eq!(player.state(), MusicState::NoTrack);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_mid_crossfade() {
        let backend = looping_backend();
        let player = player(&backend);
        player.play(&track("overworld")).await.expect("play");

        let task = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.play(&track("castle")).await })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(player.active_ramps(), 2);

        player.dispose();
        assert_eq!(player.active_ramps(), 0);
        assert!(player.is_disposed());

        let result = task.await.expect("task");
        assert_eq!(result, Err(AudioError::Disposed(PLAYER_NAME.to_string())));
        assert!(backend.voices().iter().all(|voice| !voice.is_playing()));

        // Later calls are refused without panicking.
        player.dispose();
        player.set_volume(0.2);
        player.set_muted(true);
        assert!(player.play(&track("overworld")).await.is_err());
        assert!(player.stop(Duration::ZERO).await.is_err());
        assert_eq!(player.state(), MusicState::NoTrack);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_crossfade_silences_both() {
        let backend = looping_backend();
        let player = player(&backend);
        player.play(&track("overworld")).await.expect("play");

        let task = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.play(&track("castle")).await })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;

        player.stop(Duration::from_millis(200)).await.expect("stop");
        task.await.expect("task").expect("superseded crossfade");

        assert_eq!(player.state(), MusicState::NoTrack);
        assert!(backend.voices().iter().all(|voice| !voice.is_playing()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_during_pause_fade_keeps_playing() {
        let backend = looping_backend();
        let player = player(&backend);
        player.set_volume(0.6);
        player.play(&track("overworld")).await.expect("play");

        let pausing = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.pause(Duration::from_secs(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;

        player.resume(Duration::from_millis(300)).await.expect("resume");
        pausing.await.expect("task").expect("cancelled pause");
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(player.state(), MusicState::Playing);
        assert_eq!(player.current_level(), Some(0.6));
        assert!(!backend.voices()[0].is_paused());
        assert_eq!(player.active_ramps(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_track_keeps_level_until_resume() {
        let backend = looping_backend();
        let player = player(&backend);
        player.play(&track("overworld")).await.expect("play");
        player.pause(Duration::from_millis(300)).await.expect("pause");

        player.set_volume(0.9);
        player.set_muted(true);
        player.set_muted(false);
        assert_eq!(player.current_level(), Some(0.0));

        let voice = &backend.voices()[0];
        let before = voice.volume_history().len();
        player.resume(Duration::from_millis(300)).await.expect("resume");

        let history = voice.volume_history();
        assert!(history[before..].windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(player.current_level(), Some(0.9));
    }
}
