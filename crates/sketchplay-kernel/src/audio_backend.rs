//! Audio Backend with Rodio Integration
//!
//! This module provides the transport layer every higher-level audio type
//! plays through:
//!
//! - `SoundSource`: where an asset comes from (file path or embedded bytes)
//! - `AudioBackend`: opens a source and hands back a playable `Voice`
//! - `Voice`: transport control for one decoded asset
//! - `AudioDevice` / `RodioBackend`: the rodio implementation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RodioBackend                          │
//! │  ┌───────────────┐   ┌────────────────┐   ┌───────────────┐  │
//! │  │  AudioDevice  │──▶│  open(source)  │──▶│  RodioVoice   │  │
//! │  │  (rodio)      │   │ (spawn_blocking│   │ (Sink per     │  │
//! │  │               │   │   decode)      │   │   start)      │  │
//! │  └───────────────┘   └────────────────┘   └───────────────┘  │
//! │          │                   │                    │          │
//! │          ▼                   ▼                    ▼          │
//! │    OutputStream        DecodedClip          Sink (restart)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sketchplay_kernel::audio_backend::{AudioBackend, AudioDevice, SoundSource};
//!
//! let device = AudioDevice::new()?;
//! let backend = device.backend();
//!
//! let voice = backend.open(&SoundSource::from("assets/sfx/jump.mp3")).await?;
//! voice.set_volume(0.5);
//! voice.start(false)?;
//! ```

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use thiserror::Error;
use tracing::{debug, info};

/// Lowest playback rate a voice accepts.
pub const MIN_PLAYBACK_RATE: f32 = 0.25;

/// Highest playback rate a voice accepts.
pub const MAX_PLAYBACK_RATE: f32 = 4.0;

/// Clamp a volume to `[0.0, 1.0]`.
#[must_use]
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

/// Clamp a playback rate to `[MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE]`.
#[must_use]
pub fn clamp_playback_rate(rate: f32) -> f32 {
    if rate.is_nan() {
        return 1.0;
    }
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// Audio error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    /// Failed to initialize the output device.
    #[error("Failed to initialize audio device: {0}")]
    DeviceInitFailed(String),

    /// Asset could not be read.
    #[error("Failed to load audio '{source_name}': {message}")]
    LoadFailed {
        /// Label of the source that failed.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Asset was read but could not be decoded.
    #[error("Failed to decode audio '{source_name}': {message}")]
    DecodeFailed {
        /// Label of the source that failed.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Transport rejected a start or resume.
    #[error("Playback of '{name}' failed: {message}")]
    PlaybackFailed {
        /// Sound or track name.
        name: String,
        /// Error message.
        message: String,
    },

    /// Sound is not loaded (its load failed earlier).
    #[error("Sound '{0}' is not loaded")]
    NotLoaded(String),

    /// Sound or player was disposed.
    #[error("'{0}' has been disposed")]
    Disposed(String),

    /// No sound registered under this name.
    #[error("Sound not found: {0}")]
    SoundNotFound(String),
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Where an audio asset comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum SoundSource {
    /// Asset file on disk.
    File(PathBuf),
    /// Encoded asset held in memory (for example a synthesized WAV).
    Embedded {
        /// Name used in logs.
        name: String,
        /// Encoded bytes.
        data: Arc<[u8]>,
    },
}

impl SoundSource {
    /// Create an embedded source from encoded bytes.
    #[must_use]
    pub fn embedded(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self::Embedded {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Stable label for logs and lookups.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Embedded { name, .. } => format!("embedded:{name}"),
        }
    }

    /// Check if the source is held in memory.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded { .. })
    }
}

impl fmt::Debug for SoundSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Embedded { name, data } => f
                .debug_struct("Embedded")
                .field("name", name)
                .field("bytes", &data.len())
                .finish(),
        }
    }
}

impl From<&str> for SoundSource {
    fn from(path: &str) -> Self {
        Self::File(PathBuf::from(path))
    }
}

impl From<String> for SoundSource {
    fn from(path: String) -> Self {
        Self::File(PathBuf::from(path))
    }
}

impl From<PathBuf> for SoundSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&Path> for SoundSource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

/// Transport control for one opened asset.
///
/// A voice owns at most one playback of its asset at a time: `start`
/// always restarts from the beginning.
pub trait Voice: Send + Sync + fmt::Debug {
    /// Restart playback from the beginning.
    fn start(&self, looping: bool) -> AudioResult<()>;

    /// Pause playback, keeping the position.
    fn pause(&self);

    /// Resume paused playback.
    fn resume(&self) -> AudioResult<()>;

    /// Halt playback and rewind.
    fn stop(&self);

    /// Set the output level (clamped to `[0.0, 1.0]`).
    fn set_volume(&self, volume: f32);

    /// Current output level.
    fn volume(&self) -> f32;

    /// Set the playback rate (clamped).
    fn set_speed(&self, speed: f32);

    /// Check if the voice is audibly advancing.
    fn is_playing(&self) -> bool;

    /// Check if the voice is paused.
    fn is_paused(&self) -> bool;
}

/// Opens sources into voices.
pub trait AudioBackend: Send + Sync + fmt::Debug {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Fetch and decode `source`, returning a voice ready to start.
    fn open(&self, source: &SoundSource) -> BoxFuture<'static, AudioResult<Arc<dyn Voice>>>;
}

/// Decoded PCM kept in memory so every start can rebuild a source.
#[derive(Debug, Clone)]
pub struct DecodedClip {
    /// Interleaved samples.
    pub samples: Arc<Vec<f32>>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
}

impl DecodedClip {
    /// Play length of the clip.
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as f64 / f64::from(self.channels);
        Duration::from_secs_f64(frames / f64::from(self.sample_rate))
    }

    /// Decode a source into memory.
    pub fn decode(source: &SoundSource) -> AudioResult<Self> {
        let bytes = match source {
            SoundSource::File(path) => std::fs::read(path).map_err(|e| AudioError::LoadFailed {
                source_name: source.label(),
                message: e.to_string(),
            })?,
            SoundSource::Embedded { data, .. } => data.to_vec(),
        };

        let decoder = Decoder::new(Cursor::new(bytes)).map_err(|e| AudioError::DecodeFailed {
            source_name: source.label(),
            message: e.to_string(),
        })?;

        let sample_rate = decoder.sample_rate();
        let channels = decoder.channels();
        let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();

        Ok(Self {
            samples: Arc::new(samples),
            sample_rate,
            channels,
        })
    }
}

/// Wraps rodio's output stream for audio playback.
///
/// The stream must stay alive on the thread that created it; hand
/// `backend()` to the rest of the program instead.
pub struct AudioDevice {
    /// The output stream (must be kept alive).
    _stream: OutputStream,
    /// Handle for creating sinks.
    handle: OutputStreamHandle,
}

impl fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioDevice").finish_non_exhaustive()
    }
}

impl AudioDevice {
    /// Open the default output device.
    pub fn new() -> AudioResult<Self> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?;

        info!("Audio device initialized");

        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    /// Create a backend that plays through this device.
    #[must_use]
    pub fn backend(&self) -> RodioBackend {
        RodioBackend {
            handle: self.handle.clone(),
        }
    }
}

/// Rodio implementation of [`AudioBackend`].
#[derive(Clone)]
pub struct RodioBackend {
    handle: OutputStreamHandle,
}

impl fmt::Debug for RodioBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RodioBackend").finish_non_exhaustive()
    }
}

impl AudioBackend for RodioBackend {
    fn name(&self) -> &'static str {
        "rodio"
    }

    fn open(&self, source: &SoundSource) -> BoxFuture<'static, AudioResult<Arc<dyn Voice>>> {
        let source = source.clone();
        let handle = self.handle.clone();

        async move {
            let label = source.label();
            let clip = tokio::task::spawn_blocking(move || DecodedClip::decode(&source))
                .await
                .map_err(|e| AudioError::LoadFailed {
                    source_name: label.clone(),
                    message: e.to_string(),
                })??;

            debug!(
                "Decoded {} ({} Hz, {} ch, {:.2}s)",
                label,
                clip.sample_rate,
                clip.channels,
                clip.duration().as_secs_f32()
            );

            let voice: Arc<dyn Voice> = Arc::new(RodioVoice::new(label, handle, clip));
            Ok(voice)
        }
        .boxed()
    }
}

/// Volume and speed applied to every sink a voice creates.
#[derive(Debug, Clone, Copy)]
struct VoiceControls {
    volume: f32,
    speed: f32,
}

/// A decoded clip bound to the output device.
///
/// Each `start` builds a fresh sink so a restart never waits on the
/// previous queue to drain.
pub struct RodioVoice {
    label: String,
    handle: OutputStreamHandle,
    clip: DecodedClip,
    sink: Mutex<Option<Sink>>,
    controls: Mutex<VoiceControls>,
}

impl fmt::Debug for RodioVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RodioVoice")
            .field("label", &self.label)
            .field("controls", &*self.controls.lock())
            .finish_non_exhaustive()
    }
}

impl RodioVoice {
    fn new(label: String, handle: OutputStreamHandle, clip: DecodedClip) -> Self {
        Self {
            label,
            handle,
            clip,
            sink: Mutex::new(None),
            controls: Mutex::new(VoiceControls {
                volume: 1.0,
                speed: 1.0,
            }),
        }
    }
}

impl Voice for RodioVoice {
    fn start(&self, looping: bool) -> AudioResult<()> {
        let sink = Sink::try_new(&self.handle).map_err(|e| AudioError::PlaybackFailed {
            name: self.label.clone(),
            message: e.to_string(),
        })?;

        let controls = *self.controls.lock();
        sink.set_volume(controls.volume);
        sink.set_speed(controls.speed);

        let source = SamplesBuffer::new(
            self.clip.channels,
            self.clip.sample_rate,
            (*self.clip.samples).clone(),
        );
        if looping {
            sink.append(source.repeat_infinite());
        } else {
            sink.append(source);
        }
        sink.play();

        if let Some(previous) = self.sink.lock().replace(sink) {
            previous.stop();
        }
        Ok(())
    }

    fn pause(&self) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.pause();
        }
    }

    fn resume(&self) -> AudioResult<()> {
        match self.sink.lock().as_ref() {
            Some(sink) => {
                sink.play();
                Ok(())
            },
            None => Err(AudioError::PlaybackFailed {
                name: self.label.clone(),
                message: "voice was never started".to_string(),
            }),
        }
    }

    fn stop(&self) {
        if let Some(sink) = self.sink.lock().take() {
            sink.stop();
        }
    }

    fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        self.controls.lock().volume = volume;
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.set_volume(volume);
        }
    }

    fn volume(&self) -> f32 {
        self.controls.lock().volume
    }

    fn set_speed(&self, speed: f32) {
        let speed = clamp_playback_rate(speed);
        self.controls.lock().speed = speed;
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.set_speed(speed);
        }
    }

    fn is_playing(&self) -> bool {
        self.sink
            .lock()
            .as_ref()
            .is_some_and(|sink| !sink.empty() && !sink.is_paused())
    }

    fn is_paused(&self) -> bool {
        self.sink.lock().as_ref().is_some_and(Sink::is_paused)
    }
}
