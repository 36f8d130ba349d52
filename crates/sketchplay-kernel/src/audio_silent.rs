//! Silent audio backend.
//!
//! Voices track transport state in memory against tokio's clock and never
//! touch an output device. The engine falls back to this backend when no
//! device is available, so gameplay keeps calling into audio unchanged.
//!
//! Every voice and every open is recorded, which makes the backend a
//! deterministic stand-in under `tokio::time::pause`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::audio_backend::{
    clamp_playback_rate, clamp_volume, AudioBackend, AudioError, AudioResult, SoundSource, Voice,
};

/// Default play length of a silent clip.
pub const DEFAULT_SILENT_CLIP: Duration = Duration::from_millis(500);

/// Backend that plays nothing but keeps accurate transport state.
#[derive(Debug)]
pub struct SilentBackend {
    clip_length: Option<Duration>,
    load_delay: Duration,
    missing: HashSet<String>,
    rejected: HashSet<String>,
    open_limits: HashMap<String, usize>,
    voices: Arc<Mutex<Vec<Arc<SilentVoice>>>>,
    opens: Mutex<HashMap<String, usize>>,
}

impl Default for SilentBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SilentBackend {
    /// Create a backend with the default clip length and instant loads.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clip_length: Some(DEFAULT_SILENT_CLIP),
            load_delay: Duration::ZERO,
            missing: HashSet::new(),
            rejected: HashSet::new(),
            open_limits: HashMap::new(),
            voices: Arc::new(Mutex::new(Vec::new())),
            opens: Mutex::new(HashMap::new()),
        }
    }

    /// Set how long a started voice reports itself playing.
    ///
    /// `None` keeps voices playing until stopped.
    #[must_use]
    pub fn with_clip_length(mut self, length: Option<Duration>) -> Self {
        self.clip_length = length;
        self
    }

    /// Delay every open by `delay`.
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Make opening `label` fail.
    #[must_use]
    pub fn with_missing(mut self, label: impl Into<String>) -> Self {
        self.missing.insert(label.into());
        self
    }

    /// Make starting a voice opened from `label` fail.
    #[must_use]
    pub fn with_rejected(mut self, label: impl Into<String>) -> Self {
        self.rejected.insert(label.into());
        self
    }

    /// Let `label` open successfully `opens` times; later opens fail.
    #[must_use]
    pub fn with_open_limit(mut self, label: impl Into<String>, opens: usize) -> Self {
        self.open_limits.insert(label.into(), opens);
        self
    }

    /// Number of times `label` has been opened.
    #[must_use]
    pub fn open_count(&self, label: &str) -> usize {
        self.opens.lock().get(label).copied().unwrap_or(0)
    }

    /// Every voice created so far, in creation order.
    #[must_use]
    pub fn voices(&self) -> Vec<Arc<SilentVoice>> {
        self.voices.lock().clone()
    }

    /// Voices created from `label`, in creation order.
    #[must_use]
    pub fn voices_for(&self, label: &str) -> Vec<Arc<SilentVoice>> {
        self.voices
            .lock()
            .iter()
            .filter(|voice| voice.label() == label)
            .cloned()
            .collect()
    }
}

impl AudioBackend for SilentBackend {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn open(&self, source: &SoundSource) -> BoxFuture<'static, AudioResult<Arc<dyn Voice>>> {
        let label = source.label();
        let count = {
            let mut opens = self.opens.lock();
            let count = opens.entry(label.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let missing = self.missing.contains(&label)
            || self.open_limits.get(&label).is_some_and(|limit| count > *limit);
        let rejects = self.rejected.contains(&label);
        let clip_length = self.clip_length;
        let delay = self.load_delay;
        let voices = Arc::clone(&self.voices);

        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if missing {
                return Err(AudioError::LoadFailed {
                    source_name: label,
                    message: "source not found".to_string(),
                });
            }

            let voice = Arc::new(SilentVoice::new(label, clip_length, rejects));
            voices.lock().push(Arc::clone(&voice));
            debug!("Opened silent voice {}", voice.label());

            let voice: Arc<dyn Voice> = voice;
            Ok(voice)
        }
        .boxed()
    }
}

/// Transport bookkeeping of a silent voice.
#[derive(Debug, Clone)]
struct SilentState {
    volume: f32,
    speed: f32,
    looping: bool,
    paused: bool,
    /// Play time accumulated before the last resume.
    played: Duration,
    /// When playback last (re)started advancing.
    running_since: Option<Instant>,
    starts: u32,
    history: Vec<f32>,
}

/// A voice of [`SilentBackend`].
pub struct SilentVoice {
    label: String,
    clip_length: Option<Duration>,
    rejects: bool,
    state: Mutex<SilentState>,
}

impl fmt::Debug for SilentVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SilentVoice")
            .field("label", &self.label)
            .field("volume", &state.volume)
            .field("starts", &state.starts)
            .finish_non_exhaustive()
    }
}

impl SilentVoice {
    fn new(label: String, clip_length: Option<Duration>, rejects: bool) -> Self {
        Self {
            label,
            clip_length,
            rejects,
            state: Mutex::new(SilentState {
                volume: 1.0,
                speed: 1.0,
                looping: false,
                paused: false,
                played: Duration::ZERO,
                running_since: None,
                starts: 0,
                history: Vec::new(),
            }),
        }
    }

    /// Source label this voice was opened from.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of successful starts.
    #[must_use]
    pub fn start_count(&self) -> u32 {
        self.state.lock().starts
    }

    /// Every volume written, in order.
    #[must_use]
    pub fn volume_history(&self) -> Vec<f32> {
        self.state.lock().history.clone()
    }

    /// Current playback rate.
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.state.lock().speed
    }

    fn elapsed(state: &SilentState) -> Duration {
        state.played + state.running_since.map_or(Duration::ZERO, |since| since.elapsed())
    }
}

impl Voice for SilentVoice {
    fn start(&self, looping: bool) -> AudioResult<()> {
        if self.rejects {
            return Err(AudioError::PlaybackFailed {
                name: self.label.clone(),
                message: "playback rejected".to_string(),
            });
        }
        let mut state = self.state.lock();
        state.looping = looping;
        state.paused = false;
        state.played = Duration::ZERO;
        state.running_since = Some(Instant::now());
        state.starts += 1;
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if let Some(since) = state.running_since.take() {
            state.played += since.elapsed();
            state.paused = true;
        }
    }

    fn resume(&self) -> AudioResult<()> {
        let mut state = self.state.lock();
        if state.paused {
            state.paused = false;
            state.running_since = Some(Instant::now());
            return Ok(());
        }
        if state.running_since.is_some() {
            return Ok(());
        }
        Err(AudioError::PlaybackFailed {
            name: self.label.clone(),
            message: "voice was never started".to_string(),
        })
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.paused = false;
        state.played = Duration::ZERO;
        state.running_since = None;
    }

    fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        let mut state = self.state.lock();
        state.volume = volume;
        state.history.push(volume);
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn set_speed(&self, speed: f32) {
        self.state.lock().speed = clamp_playback_rate(speed);
    }

    fn is_playing(&self) -> bool {
        let state = self.state.lock();
        if state.running_since.is_none() {
            return false;
        }
        if state.looping {
            return true;
        }
        self.clip_length
            .map_or(true, |length| Self::elapsed(&state) < length)
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }
}
