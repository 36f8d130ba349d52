//! # SketchPlay Kernel
//!
//! Audio transport and waveform synthesis.
//!
//! This crate provides the lowest audio layer:
//! - `AudioBackend` / `Voice` traits every sound plays through
//! - A rodio backend bound to the default output device
//! - A silent backend used when no device exists (and in tests)
//! - A procedural tone synthesizer with a 16-bit PCM WAV encoder
//!
//! ## Architecture
//!
//! Higher layers never touch rodio directly. They hold an
//! `Arc<dyn AudioBackend>`, open `SoundSource`s into voices, and drive
//! voices through transport calls. Swapping the backend swaps the output.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod audio_backend;
pub mod audio_silent;
pub mod synth;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audio_backend::*;
    pub use crate::audio_silent::*;
    pub use crate::synth::*;
}

pub use prelude::*;
