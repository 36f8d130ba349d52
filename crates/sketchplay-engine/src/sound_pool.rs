//! Fixed-size reuse pools for high-frequency effects.
//!
//! A pool holds independent copies of one sound so rapid triggers overlap
//! instead of cutting each other off. Selection picks the first idle copy;
//! when every copy is busy the first one is restarted. Pools never grow.

use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use crate::audio_sound::PlayableSound;

/// Independent copies of one sound for overlapping playback.
#[derive(Debug)]
pub struct SoundPool {
    name: String,
    sounds: Vec<Arc<PlayableSound>>,
}

impl SoundPool {
    /// Create `size` unloaded copies of `template` (at least one).
    #[must_use]
    pub fn new(template: &PlayableSound, size: usize) -> Self {
        let sounds = (0..size.max(1))
            .map(|_| Arc::new(template.duplicate()))
            .collect();
        Self {
            name: template.name().to_string(),
            sounds,
        }
    }

    /// Load every copy concurrently. Returns how many loaded.
    pub async fn load_all(&self) -> usize {
        let results = join_all(self.sounds.iter().map(|sound| sound.load())).await;
        let loaded = results.iter().filter(|result| result.is_ok()).count();
        debug!("Pool {}: {}/{} copies loaded", self.name, loaded, self.sounds.len());
        loaded
    }

    /// Pick the copy to play next.
    ///
    /// The first copy not playing, or the first copy when all are busy.
    #[must_use]
    pub fn acquire(&self) -> Option<Arc<PlayableSound>> {
        self.sounds
            .iter()
            .find(|sound| !sound.is_playing())
            .or_else(|| self.sounds.first())
            .cloned()
    }

    /// Stop every copy.
    pub fn stop_all(&self) {
        for sound in &self.sounds {
            sound.stop();
        }
    }

    /// Dispose every copy.
    pub fn dispose_all(&self) {
        for sound in &self.sounds {
            sound.dispose();
        }
    }

    /// Name of the pooled sound.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All copies, in selection order.
    #[must_use]
    pub fn sounds(&self) -> &[Arc<PlayableSound>] {
        &self.sounds
    }

    /// Number of copies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    /// Check if the pool has no copies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    /// Number of copies currently playing.
    #[must_use]
    pub fn playing_count(&self) -> usize {
        self.sounds.iter().filter(|sound| sound.is_playing()).count()
    }
}
