//! # SketchPlay Gameplay
//!
//! Game-facing audio vocabulary.
//!
//! This crate provides:
//! - The named sound effects gameplay triggers
//! - Which effects play through reuse pools
//! - Music track descriptors and fade options

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod music;
pub mod sound_effects;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::music::*;
    pub use crate::sound_effects::*;
}

pub use prelude::*;
