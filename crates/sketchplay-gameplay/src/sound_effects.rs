//! Named game sound effects.
//!
//! This module provides:
//! - The reference set of effects gameplay triggers by name
//! - Default volumes and asset file mappings
//! - The high-frequency subset that plays through reuse pools
//! - Synthesized placeholders for effects that have a generator

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sketchplay_kernel::synth::{SynthSound, ToneSynth};
use tracing::debug;

/// Number of clones kept per pooled effect.
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Subdirectory of the asset root holding effect files.
pub const SFX_DIR: &str = "sfx";

/// Game sound effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundEffect {
    // === Player ===
    /// Player jumps.
    Jump,
    /// Player lands.
    Land,
    /// Player dies.
    Death,
    /// Player collects a power-up.
    #[serde(rename = "powerup")]
    PowerUp,

    // === Pickups ===
    /// Coin collected.
    Coin,
    /// Extra life collected.
    Life,

    // === Enemies ===
    /// Enemy stomped.
    EnemyStomp,
    /// Enemy defeated.
    EnemyDefeat,

    // === World ===
    /// Block broken.
    BlockBreak,
    /// Block bumped from below.
    BlockBump,
    /// Pipe entered.
    Pipe,

    // === UI ===
    /// Menu cursor moved.
    MenuSelect,
    /// Menu choice confirmed.
    MenuConfirm,
    /// Game paused.
    Pause,

    // === Flow ===
    /// Level begins.
    LevelStart,
    /// Level cleared.
    LevelComplete,
    /// Game over.
    GameOver,
}

impl SoundEffect {
    /// Catalog name of this effect.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Jump => "jump",
            Self::Land => "land",
            Self::Death => "death",
            Self::PowerUp => "powerup",
            Self::Coin => "coin",
            Self::Life => "life",
            Self::EnemyStomp => "enemy_stomp",
            Self::EnemyDefeat => "enemy_defeat",
            Self::BlockBreak => "block_break",
            Self::BlockBump => "block_bump",
            Self::Pipe => "pipe",
            Self::MenuSelect => "menu_select",
            Self::MenuConfirm => "menu_confirm",
            Self::Pause => "pause",
            Self::LevelStart => "level_start",
            Self::LevelComplete => "level_complete",
            Self::GameOver => "game_over",
        }
    }

    /// Look up an effect by catalog name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|effect| effect.name() == name)
    }

    /// Get default volume (0.0-1.0).
    #[must_use]
    pub fn default_volume(self) -> f32 {
        match self {
            Self::LevelComplete => 0.8,
            Self::Death | Self::Life | Self::GameOver => 0.7,
            Self::PowerUp | Self::LevelStart => 0.6,
            Self::Jump
            | Self::Coin
            | Self::EnemyStomp
            | Self::EnemyDefeat
            | Self::BlockBreak
            | Self::Pipe => 0.5,
            Self::BlockBump | Self::MenuConfirm | Self::Pause => 0.4,
            Self::Land | Self::MenuSelect => 0.3,
        }
    }

    /// Asset file name.
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.mp3", self.name())
    }

    /// Asset path under `asset_dir`.
    #[must_use]
    pub fn asset_path(self, asset_dir: &Path) -> PathBuf {
        asset_dir.join(SFX_DIR).join(self.file_name())
    }

    /// Check if this effect plays through a reuse pool by default.
    #[must_use]
    pub fn is_pooled_by_default(self) -> bool {
        matches!(self, Self::Coin | Self::Jump | Self::EnemyStomp)
    }

    /// Effects pooled by default.
    #[must_use]
    pub fn default_pooled() -> Vec<Self> {
        Self::all()
            .into_iter()
            .filter(|effect| effect.is_pooled_by_default())
            .collect()
    }

    /// Synthesize a stand-in for this effect, if it has a generator.
    #[must_use]
    pub fn placeholder(self, synth: &ToneSynth) -> Option<SynthSound> {
        let sound = match self {
            Self::Jump => synth.jump(),
            Self::Coin => synth.coin(),
            Self::EnemyStomp => synth.stomp(),
            Self::PowerUp => synth.power_up(),
            Self::Death => synth.death(),
            _ => return None,
        };
        debug!("Synthesized placeholder for {}", self.name());
        Some(sound)
    }

    /// Get all effects.
    #[must_use]
    pub const fn all() -> [Self; 17] {
        [
            Self::Jump,
            Self::Land,
            Self::Death,
            Self::PowerUp,
            Self::Coin,
            Self::Life,
            Self::EnemyStomp,
            Self::EnemyDefeat,
            Self::BlockBreak,
            Self::BlockBump,
            Self::Pipe,
            Self::MenuSelect,
            Self::MenuConfirm,
            Self::Pause,
            Self::LevelStart,
            Self::LevelComplete,
            Self::GameOver,
        ]
    }
}

impl fmt::Display for SoundEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
