//! Procedural waveform synthesis.
//!
//! Generates short placeholder effects and encodes them as mono 16-bit PCM
//! WAV, so a build without asset files still has something to play.
//!
//! ```ignore
//! use sketchplay_kernel::synth::{ToneSynth, Waveform};
//!
//! let synth = ToneSynth::default();
//! let beep = synth.generate_tone(440.0, 0.2, Waveform::Sine);
//! let voice = backend.open(&beep.source()).await?;
//! ```

use std::f32::consts::TAU;
use std::sync::Arc;

use crate::audio_backend::SoundSource;

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Gain applied to every tone so peaks leave headroom.
pub const TONE_GAIN: f32 = 0.3;

/// Decay rate of the envelope used by `generate_tone`.
pub const TONE_DECAY: f32 = 3.0;

/// Decay rate of each arpeggio note.
pub const NOTE_DECAY: f32 = 2.0;

/// Decay rate of the death sweep.
pub const SWEEP_DECAY: f32 = 1.5;

/// Arpeggio played by `power_up` (C5, E5, G5, C6).
pub const POWER_UP_NOTES: [f32; 4] = [523.25, 659.25, 783.99, 1046.50];

/// Size of the RIFF/WAVE header written by [`encode_wav`].
pub const WAV_HEADER_LEN: usize = 44;

/// Oscillator shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waveform {
    /// Pure sine.
    Sine,
    /// Hard-edged square.
    Square,
    /// Rising ramp.
    Sawtooth,
    /// Linear up/down ramp.
    Triangle,
}

impl Waveform {
    /// Oscillator value at `phase` radians, in `[-1.0, 1.0]`.
    #[must_use]
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Self::Sine => phase.sin(),
            Self::Square => {
                if phase.sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            },
            Self::Sawtooth => {
                let cycles = phase / TAU;
                2.0 * (cycles - (cycles + 0.5).floor())
            },
            Self::Triangle => (2.0 / std::f32::consts::PI) * phase.sin().asin(),
        }
    }

    /// Get all waveforms.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Sine, Self::Square, Self::Sawtooth, Self::Triangle]
    }
}

/// A synthesized, encoded effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthSound {
    /// Effect name.
    pub name: String,
    /// Sample rate of the encoded data.
    pub sample_rate: u32,
    /// Complete WAV file.
    pub wav: Arc<[u8]>,
}

impl SynthSound {
    /// Source that plays this sound from memory.
    #[must_use]
    pub fn source(&self) -> SoundSource {
        SoundSource::Embedded {
            name: self.name.clone(),
            data: Arc::clone(&self.wav),
        }
    }

    /// Number of encoded sample frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.wav.len().saturating_sub(WAV_HEADER_LEN) / 2
    }
}

/// Stateless tone generator bound to a sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneSynth {
    sample_rate: u32,
}

impl Default for ToneSynth {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl ToneSynth {
    /// Create a synth producing `sample_rate` frames per second.
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
        }
    }

    /// Output sample rate.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frames(&self, duration_secs: f32) -> usize {
        (self.sample_rate as f32 * duration_secs.max(0.0)) as usize
    }

    fn finish(&self, name: &str, samples: &[f32]) -> SynthSound {
        SynthSound {
            name: name.to_string(),
            sample_rate: self.sample_rate,
            wav: encode_wav(samples, self.sample_rate).into(),
        }
    }

    /// Raw samples of a decaying tone.
    #[must_use]
    pub fn tone_samples(&self, frequency_hz: f32, duration_secs: f32, waveform: Waveform) -> Vec<f32> {
        let rate = self.sample_rate as f32;
        (0..self.frames(duration_secs))
            .map(|i| {
                let t = i as f32 / rate;
                let envelope = (-TONE_DECAY * t).exp();
                waveform.sample(TAU * frequency_hz * t) * envelope * TONE_GAIN
            })
            .collect()
    }

    /// A single decaying tone.
    #[must_use]
    pub fn generate_tone(&self, frequency_hz: f32, duration_secs: f32, waveform: Waveform) -> SynthSound {
        let samples = self.tone_samples(frequency_hz, duration_secs, waveform);
        let name = format!("tone_{waveform:?}_{frequency_hz}hz").to_lowercase();
        self.finish(&name, &samples)
    }

    /// Short square blip.
    #[must_use]
    pub fn jump(&self) -> SynthSound {
        let samples = self.tone_samples(440.0, 0.15, Waveform::Square);
        self.finish("jump", &samples)
    }

    /// Short bright sine.
    #[must_use]
    pub fn coin(&self) -> SynthSound {
        let samples = self.tone_samples(988.0, 0.1, Waveform::Sine);
        self.finish("coin", &samples)
    }

    /// Low thud.
    #[must_use]
    pub fn stomp(&self) -> SynthSound {
        let samples = self.tone_samples(150.0, 0.1, Waveform::Triangle);
        self.finish("enemy_stomp", &samples)
    }

    /// Four-note ascending arpeggio.
    #[must_use]
    pub fn power_up(&self) -> SynthSound {
        let rate = self.sample_rate as f32;
        let total = self.frames(0.4);
        let slot = (total / POWER_UP_NOTES.len()).max(1);

        let samples: Vec<f32> = (0..total)
            .map(|i| {
                let note = (i / slot).min(POWER_UP_NOTES.len() - 1);
                let local_t = (i - note * slot) as f32 / rate;
                let envelope = (-NOTE_DECAY * local_t).exp();
                (TAU * POWER_UP_NOTES[note] * local_t).sin() * envelope * TONE_GAIN
            })
            .collect();

        self.finish("powerup", &samples)
    }

    /// Falling exponential sweep.
    #[must_use]
    pub fn death(&self) -> SynthSound {
        const START_HZ: f32 = 440.0;
        const END_HZ: f32 = 110.0;
        const DURATION: f32 = 1.0;

        let rate = self.sample_rate as f32;
        let mut phase = 0.0f32;
        let samples: Vec<f32> = (0..self.frames(DURATION))
            .map(|i| {
                let t = i as f32 / rate;
                let frequency = START_HZ * (END_HZ / START_HZ).powf(t / DURATION);
                let value = phase.sin() * (-SWEEP_DECAY * t).exp() * TONE_GAIN;
                phase = (phase + TAU * frequency / rate) % TAU;
                value
            })
            .collect();

        self.finish("death", &samples)
    }
}

/// Encode mono float samples as a 16-bit PCM WAV file.
#[must_use]
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * usize::from(block_align)) as u32;

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + data_size as usize);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_size).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * u32::from(block_align);
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());

    for &sample in samples {
        wav.extend_from_slice(&to_pcm16(sample).to_le_bytes());
    }

    wav
}

/// Convert a float sample to signed 16-bit PCM.
#[must_use]
pub fn to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32_768.0) as i16
    } else {
        (s * 32_767.0) as i16
    }
}
