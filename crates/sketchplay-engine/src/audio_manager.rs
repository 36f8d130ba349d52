//! Audio coordination.
//!
//! The [`AudioManager`] is the single entry point gameplay talks to. It owns:
//! - A catalog of named [`PlayableSound`]s
//! - Reuse pools for high-frequency effects
//! - One [`MusicPlayer`]
//! - The persisted [`AudioSettings`]
//!
//! The composition root builds one manager and shares it by `Arc`.
//! Nothing here surfaces failures to gameplay: the outermost methods log
//! and discard them, while `try_*` variants return them for callers that
//! care.
//!
//! # Architecture
//!
//! ```text
//! gameplay ──▶ jump() / collect_coin() / play_music() ...
//!                │
//!                ▼
//!           resolve(name) ──▶ Pooled ──▶ SoundPool::acquire ──┐
//!                │                                            ├──▶ PlayableSound::play
//!                └──────────▶ Catalog ────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use sketchplay_gameplay::music::{MusicTrack, DEFAULT_FADE_MS};
use sketchplay_gameplay::sound_effects::{SoundEffect, DEFAULT_POOL_SIZE};
use sketchplay_kernel::audio_backend::{AudioBackend, AudioError, AudioResult};
use tracing::{debug, info, warn};

use crate::audio_catalog::SoundDefinition;
use crate::audio_settings::{AudioSettings, AudioSettingsPatch, SettingsStore};
use crate::audio_sound::{PlayOverrides, PlayableSound};
use crate::music_player::MusicPlayer;
use crate::sound_pool::SoundPool;

const MANAGER_NAME: &str = "audio manager";

/// Tunables of an [`AudioManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioManagerConfig {
    /// Copies per pooled sound.
    pub pool_size: usize,
    /// Names that play through pools.
    pub pooled_sounds: Vec<String>,
    /// Fade-in for `resume_music(true)` when no track is current.
    pub fade_in: Duration,
    /// Fade-out for `stop_music(true)` and `pause_music(true)` when no track is current.
    pub fade_out: Duration,
}

impl Default for AudioManagerConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            pooled_sounds: SoundEffect::default_pooled()
                .into_iter()
                .map(|effect| effect.name().to_string())
                .collect(),
            fade_in: Duration::from_millis(DEFAULT_FADE_MS),
            fade_out: Duration::from_millis(DEFAULT_FADE_MS),
        }
    }
}

/// Per-call options for [`AudioManager::play_sound`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SoundRequest {
    /// Requested volume before category and master scaling (default 1.0).
    pub volume: Option<f32>,
    /// Playback rate for this call.
    pub playback_rate: Option<f32>,
}

impl SoundRequest {
    /// Request a volume.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Request a playback rate.
    #[must_use]
    pub fn with_playback_rate(mut self, rate: f32) -> Self {
        self.playback_rate = Some(rate);
        self
    }
}

/// Where a sound name resolves to.
#[derive(Debug, Clone)]
pub enum SoundResolution {
    /// A copy picked from the name's pool.
    Pooled(Arc<PlayableSound>),
    /// The catalog entry.
    Catalog(Arc<PlayableSound>),
    /// Nothing registered under the name.
    Missing,
}

impl SoundResolution {
    /// The resolved sound, if any.
    #[must_use]
    pub fn sound(&self) -> Option<&Arc<PlayableSound>> {
        match self {
            Self::Pooled(sound) | Self::Catalog(sound) => Some(sound),
            Self::Missing => None,
        }
    }
}

/// Result of a successful [`AudioManager::try_play_sound`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayOutcome {
    /// Sound effects are muted; nothing played.
    Muted,
    /// Played at this effective volume.
    Played {
        /// Volume after category and master scaling.
        volume: f32,
    },
}

/// Coordinates sound effects, music and settings.
pub struct AudioManager {
    backend: Arc<dyn AudioBackend>,
    store: Arc<dyn SettingsStore>,
    config: AudioManagerConfig,
    settings: RwLock<AudioSettings>,
    catalog: RwLock<HashMap<String, Arc<PlayableSound>>>,
    pools: RwLock<HashMap<String, Arc<SoundPool>>>,
    music: MusicPlayer,
    disposed: AtomicBool,
}

impl fmt::Debug for AudioManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioManager")
            .field("backend", &self.backend.name())
            .field("settings", &*self.settings.read())
            .field("sounds", &self.catalog.read().len())
            .field("pools", &self.pools.read().len())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl AudioManager {
    /// Create a manager, loading persisted settings from `store`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        store: Arc<dyn SettingsStore>,
        config: AudioManagerConfig,
    ) -> Self {
        let settings = AudioSettings::load_from(store.as_ref());
        let music = MusicPlayer::new(Arc::clone(&backend));

        let manager = Self {
            backend,
            store,
            config,
            settings: RwLock::new(settings),
            catalog: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
            music,
            disposed: AtomicBool::new(false),
        };
        manager.apply_music_settings();

        info!("Audio manager created ({} backend)", manager.backend.name());
        manager
    }

    fn check_alive(&self) -> AudioResult<()> {
        if self.is_disposed() {
            return Err(AudioError::Disposed(MANAGER_NAME.to_string()));
        }
        Ok(())
    }

    /// Load `definitions` and build pools for the pooled names.
    ///
    /// Loads run concurrently. Failures are logged and skipped. Returns the
    /// number of sounds that entered the catalog.
    pub async fn initialize(&self, definitions: &[SoundDefinition]) -> usize {
        if self.check_alive().is_err() {
            debug!("initialize called after dispose");
            return 0;
        }

        let mut seen = HashSet::new();
        let sounds: Vec<Arc<PlayableSound>> = definitions
            .iter()
            .filter(|definition| {
                let known = self.catalog.read().contains_key(&definition.name)
                    || !seen.insert(definition.name.as_str());
                if known {
                    debug!("Sound {} already registered", definition.name);
                }
                !known
            })
            .map(|definition| {
                Arc::new(PlayableSound::from_definition(
                    definition,
                    Arc::clone(&self.backend),
                ))
            })
            .collect();

        let results = join_all(sounds.iter().map(|sound| sound.load())).await;

        let mut loaded = Vec::new();
        for (sound, result) in sounds.into_iter().zip(results) {
            match result {
                Ok(()) => loaded.push(sound),
                Err(e) => warn!("Skipping sound {}: {}", sound.name(), e),
            }
        }

        let candidates: Vec<Arc<SoundPool>> = loaded
            .iter()
            .filter(|sound| self.config.pooled_sounds.iter().any(|name| name == sound.name()))
            .map(|sound| Arc::new(SoundPool::new(sound, self.config.pool_size)))
            .collect();
        let counts = join_all(candidates.iter().map(|pool| pool.load_all())).await;

        // A pool only serves when every copy loaded; otherwise the catalog entry plays.
        let mut pools = Vec::new();
        for (pool, count) in candidates.into_iter().zip(counts) {
            if count == pool.len() {
                pools.push(pool);
            } else {
                warn!(
                    "Pool {} unavailable: {}/{} copies loaded",
                    pool.name(),
                    count,
                    pool.len()
                );
                pool.dispose_all();
            }
        }

        let count = loaded.len();
        {
            let mut catalog = self.catalog.write();
            for sound in loaded {
                catalog.insert(sound.name().to_string(), sound);
            }
        }
        {
            let mut registered = self.pools.write();
            for pool in pools {
                registered.insert(pool.name().to_string(), pool);
            }
        }

        info!(
            "Audio initialized: {}/{} sounds loaded, {} pools",
            count,
            definitions.len(),
            self.pools.read().len()
        );
        count
    }

    /// Resolve `name` to a pooled copy, then the catalog entry.
    #[must_use]
    pub fn resolve(&self, name: &str) -> SoundResolution {
        if let Some(sound) = self.pools.read().get(name).and_then(|pool| pool.acquire()) {
            return SoundResolution::Pooled(sound);
        }
        match self.catalog.read().get(name) {
            Some(sound) => SoundResolution::Catalog(Arc::clone(sound)),
            None => SoundResolution::Missing,
        }
    }

    /// Play `name`, reporting what happened.
    ///
    /// Effective volume is `request.volume (default 1.0) × sfx × master`.
    pub async fn try_play_sound(&self, name: &str, request: SoundRequest) -> AudioResult<PlayOutcome> {
        self.check_alive()?;

        let settings = *self.settings.read();
        if settings.is_sfx_muted() {
            return Ok(PlayOutcome::Muted);
        }

        let sound = match self.resolve(name) {
            SoundResolution::Pooled(sound) | SoundResolution::Catalog(sound) => sound,
            SoundResolution::Missing => return Err(AudioError::SoundNotFound(name.to_string())),
        };

        let volume = settings.effective_sfx_volume(request.volume.unwrap_or(1.0));
        sound
            .play(PlayOverrides {
                volume: Some(volume),
                playback_rate: request.playback_rate,
            })
            .await?;
        Ok(PlayOutcome::Played { volume })
    }

    /// Play `name`. Failures are logged, never returned.
    pub async fn play_sound(&self, name: &str, request: SoundRequest) {
        match self.try_play_sound(name, request).await {
            Ok(PlayOutcome::Played { volume }) => debug!("Played {name} at {volume:.2}"),
            Ok(PlayOutcome::Muted) => debug!("Sound effects muted, skipped {name}"),
            Err(AudioError::Disposed(_)) => debug!("Ignoring {name}: audio disposed"),
            Err(e) => warn!("Could not play {name}: {e}"),
        }
    }

    /// Stop the catalog entry and every pooled copy of `name`.
    pub fn stop_sound(&self, name: &str) {
        if let Some(sound) = self.catalog.read().get(name) {
            sound.stop();
        }
        if let Some(pool) = self.pools.read().get(name) {
            pool.stop_all();
        }
    }

    fn apply_music_settings(&self) {
        let settings = *self.settings.read();
        self.music.set_volume(settings.effective_music_volume());
        self.music.set_muted(settings.is_music_muted());
    }

    fn fade_or_instant(fade: bool, duration: Duration) -> Duration {
        if fade {
            duration
        } else {
            Duration::ZERO
        }
    }

    /// Fade-out of the current track, or the configured one.
    fn music_fade_out(&self) -> Duration {
        self.music
            .current_options()
            .map_or(self.config.fade_out, |options| options.fade_out())
    }

    /// Fade-in of the current track, or the configured one.
    fn music_fade_in(&self) -> Duration {
        self.music
            .current_options()
            .map_or(self.config.fade_in, |options| options.fade_in())
    }

    /// Play `track`, crossfading from any current track.
    pub async fn try_play_music(&self, track: &MusicTrack) -> AudioResult<()> {
        self.check_alive()?;
        self.apply_music_settings();
        self.music.play(track).await
    }

    /// Play `track`. Failures are logged, never returned.
    pub async fn play_music(&self, track: &MusicTrack) {
        if let Err(e) = self.try_play_music(track).await {
            log_music_error("play", &e);
        }
    }

    /// Stop music, fading out when `fade` is set.
    pub async fn stop_music(&self, fade: bool) {
        let result = async {
            self.check_alive()?;
            self.apply_music_settings();
            self.music
                .stop(Self::fade_or_instant(fade, self.music_fade_out()))
                .await
        }
        .await;
        if let Err(e) = result {
            log_music_error("stop", &e);
        }
    }

    /// Pause music, fading out when `fade` is set.
    pub async fn pause_music(&self, fade: bool) {
        let result = async {
            self.check_alive()?;
            self.apply_music_settings();
            self.music
                .pause(Self::fade_or_instant(fade, self.music_fade_out()))
                .await
        }
        .await;
        if let Err(e) = result {
            log_music_error("pause", &e);
        }
    }

    /// Resume music, fading in when `fade` is set.
    pub async fn resume_music(&self, fade: bool) {
        let result = async {
            self.check_alive()?;
            self.apply_music_settings();
            self.music
                .resume(Self::fade_or_instant(fade, self.music_fade_in()))
                .await
        }
        .await;
        if let Err(e) = result {
            log_music_error("resume", &e);
        }
    }

    /// Merge `patch` into the settings, apply them to music and persist.
    pub fn update_settings(&self, patch: AudioSettingsPatch) {
        if self.is_disposed() {
            debug!("update_settings called after dispose");
            return;
        }

        let settings = {
            let mut settings = self.settings.write();
            patch.apply(&mut settings);
            *settings
        };
        self.apply_music_settings();

        match settings.save_to(self.store.as_ref()) {
            Ok(()) => debug!("Audio settings updated"),
            Err(e) => warn!("Failed to persist audio settings: {e}"),
        }
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> AudioSettings {
        *self.settings.read()
    }

    /// Check if `name` is in the catalog and loaded.
    #[must_use]
    pub fn is_sound_loaded(&self, name: &str) -> bool {
        self.catalog
            .read()
            .get(name)
            .is_some_and(|sound| sound.is_loaded())
    }

    /// Names of the loaded sounds, sorted.
    #[must_use]
    pub fn loaded_sounds(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .catalog
            .read()
            .values()
            .filter(|sound| sound.is_loaded())
            .map(|sound| sound.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Pool for `name`, if it has one.
    #[must_use]
    pub fn pool(&self, name: &str) -> Option<Arc<SoundPool>> {
        self.pools.read().get(name).cloned()
    }

    /// The music player.
    #[must_use]
    pub fn music_player(&self) -> &MusicPlayer {
        &self.music
    }

    /// Manager tunables.
    #[must_use]
    pub fn config(&self) -> &AudioManagerConfig {
        &self.config
    }

    /// Release every sound and the music player. Settings stay persisted.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let sounds: Vec<Arc<PlayableSound>> =
            self.catalog.write().drain().map(|(_, sound)| sound).collect();
        let pools: Vec<Arc<SoundPool>> =
            self.pools.write().drain().map(|(_, pool)| pool).collect();

        for sound in &sounds {
            sound.dispose();
        }
        for pool in &pools {
            pool.dispose_all();
        }
        self.music.dispose();

        info!(
            "Audio manager disposed ({} sounds, {} pools)",
            sounds.len(),
            pools.len()
        );
    }

    /// Check if the manager was disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    async fn play_effect(&self, effect: SoundEffect) {
        self.play_sound(effect.name(), SoundRequest::default()).await;
    }

    // === Player ===

    /// Play the jump effect.
    pub async fn jump(&self) {
        self.play_effect(SoundEffect::Jump).await;
    }

    /// Play the landing effect.
    pub async fn land(&self) {
        self.play_effect(SoundEffect::Land).await;
    }

    /// Play the death effect.
    pub async fn death(&self) {
        self.play_effect(SoundEffect::Death).await;
    }

    /// Play the power-up effect.
    pub async fn power_up(&self) {
        self.play_effect(SoundEffect::PowerUp).await;
    }

    // === Pickups ===

    /// Play the coin effect.
    pub async fn collect_coin(&self) {
        self.play_effect(SoundEffect::Coin).await;
    }

    /// Play the extra-life effect.
    pub async fn extra_life(&self) {
        self.play_effect(SoundEffect::Life).await;
    }

    // === Enemies ===

    /// Play the stomp effect.
    pub async fn stomp_enemy(&self) {
        self.play_effect(SoundEffect::EnemyStomp).await;
    }

    /// Play the enemy-defeat effect.
    pub async fn defeat_enemy(&self) {
        self.play_effect(SoundEffect::EnemyDefeat).await;
    }

    // === World ===

    /// Play the block-break effect.
    pub async fn break_block(&self) {
        self.play_effect(SoundEffect::BlockBreak).await;
    }

    /// Play the block-bump effect.
    pub async fn bump_block(&self) {
        self.play_effect(SoundEffect::BlockBump).await;
    }

    /// Play the pipe effect.
    pub async fn enter_pipe(&self) {
        self.play_effect(SoundEffect::Pipe).await;
    }

    // === UI ===

    /// Play the menu-select effect.
    pub async fn menu_select(&self) {
        self.play_effect(SoundEffect::MenuSelect).await;
    }

    /// Play the menu-confirm effect.
    pub async fn menu_confirm(&self) {
        self.play_effect(SoundEffect::MenuConfirm).await;
    }

    /// Play the pause effect.
    pub async fn pause_game(&self) {
        self.play_effect(SoundEffect::Pause).await;
    }

    // === Flow ===

    /// Play the level-start effect.
    pub async fn level_start(&self) {
        self.play_effect(SoundEffect::LevelStart).await;
    }

    /// Play the level-complete effect.
    pub async fn level_complete(&self) {
        self.play_effect(SoundEffect::LevelComplete).await;
    }

    /// Play the game-over effect.
    pub async fn game_over(&self) {
        self.play_effect(SoundEffect::GameOver).await;
    }
}

fn log_music_error(action: &str, error: &AudioError) {
    match error {
        AudioError::Disposed(_) => debug!("Ignoring music {action}: audio disposed"),
        _ => warn!("Music {action} failed: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_catalog::{reference_catalog, SoundOptions};
    use crate::audio_settings::{MemorySettingsStore, SETTINGS_KEY};
    use crate::music_player::MusicState;
    use sketchplay_gameplay::music::MusicOptions;
    use sketchplay_kernel::audio_backend::{SoundSource, Voice};
    use sketchplay_kernel::audio_silent::SilentBackend;
    use std::path::Path;

    struct Harness {
        backend: Arc<SilentBackend>,
        store: Arc<MemorySettingsStore>,
        manager: Arc<AudioManager>,
    }

    fn harness_with(backend: SilentBackend, store: MemorySettingsStore) -> Harness {
        let backend = Arc::new(backend);
        let store = Arc::new(store);
        let dyn_backend: Arc<dyn AudioBackend> = backend.clone();
        let dyn_store: Arc<dyn SettingsStore> = store.clone();
        let manager = Arc::new(AudioManager::new(
            dyn_backend,
            dyn_store,
            AudioManagerConfig::default(),
        ));
        Harness {
            backend,
            store,
            manager,
        }
    }

    fn harness() -> Harness {
        harness_with(
            SilentBackend::new().with_clip_length(None),
            MemorySettingsStore::new(),
        )
    }

    fn catalog() -> Vec<SoundDefinition> {
        reference_catalog(Path::new("assets"), None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_loads_catalog_and_pools() {
        let h = harness();
        let loaded = h.manager.initialize(&catalog()).await;

        assert_eq!(loaded, 17);
        assert_eq!(h.manager.loaded_sounds().len(), 17);
        assert!(h.manager.is_sound_loaded("jump"));
        for name in ["coin", "jump", "enemy_stomp"] {
            let pool = h.manager.pool(name).expect("pooled name has a pool");
            assert_eq!(pool.len(), 3);
        }
        assert!(h.manager.pool("land").is_none());
        // One catalog voice plus three pool copies.
        assert_eq!(h.backend.voices_for("assets/sfx/coin.mp3").len(), 4);
        assert_eq!(h.backend.voices_for("assets/sfx/land.mp3").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loaded_sounds_sorted() {
        let h = harness();
        h.manager
            .initialize(&[
                SoundDefinition::new("zap", "sfx/zap.mp3"),
                SoundDefinition::new("alarm", "sfx/alarm.mp3"),
                SoundDefinition::new("menu", "sfx/menu.mp3"),
            ])
            .await;
        assert_eq!(h.manager.loaded_sounds(), vec!["alarm", "menu", "zap"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_tolerates_partial_failure() {
        let h = harness_with(
            SilentBackend::new()
                .with_missing("assets/sfx/pipe.mp3")
                .with_missing("assets/sfx/coin.mp3"),
            MemorySettingsStore::new(),
        );
        let loaded = h.manager.initialize(&catalog()).await;

        assert_eq!(loaded, 15);
        assert!(!h.manager.is_sound_loaded("pipe"));
        assert!(h.manager.pool("coin").is_none());
        assert!(matches!(h.manager.resolve("pipe"), SoundResolution::Missing));
        assert!(matches!(
            h.manager.try_play_sound("pipe", SoundRequest::default()).await,
            Err(AudioError::SoundNotFound(_))
        ));
        h.manager.enter_pipe().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_effective_volume() {
        let store = MemorySettingsStore::new()
            .with_entry(SETTINGS_KEY, r#"{"masterVolume": 0.5, "sfxVolume": 0.8}"#);
        let h = harness_with(SilentBackend::new().with_clip_length(None), store);
        h.manager.initialize(&catalog()).await;

        let outcome = h
            .manager
            .try_play_sound("land", SoundRequest::default().with_volume(0.5))
            .await
            .expect("play");

        let PlayOutcome::Played { volume } = outcome else {
            panic!("expected playback, got {outcome:?}");
        };
        assert!((volume - 0.2).abs() < 1e-6);
        let voice = &h.backend.voices_for("assets/sfx/land.mp3")[0];
        assert!((voice.volume() - 0.2).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_request_volume_is_one() {
        let h = harness();
        h.manager.initialize(&catalog()).await;

        let outcome = h
            .manager
            .try_play_sound("pause", SoundRequest::default())
            .await
            .expect("play");
        // 1.0 × 0.8 × 0.7
        let PlayOutcome::Played { volume } = outcome else {
            panic!("expected playback, got {outcome:?}");
        };
        assert!((volume - 0.56).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_exhaustion_reuses_first_copy() {
        let h = harness();
        h.manager.initialize(&catalog()).await;

        for _ in 0..4 {
            h.manager.collect_coin().await;
        }

        let voices = h.backend.voices_for("assets/sfx/coin.mp3");
        assert_eq!(voices.len(), 4);
        let pool = h.manager.pool("coin").expect("coin pool");
        assert_eq!(pool.playing_count(), 3);
        assert!(!h
            .manager
            .catalog
            .read()
            .get("coin")
            .expect("coin in catalog")
            .is_playing());

        let starts: u32 = voices.iter().map(|voice| voice.start_count()).sum();
        assert_eq!(starts, 4);
        assert!(voices.iter().any(|voice| voice.start_count() == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_order() {
        let h = harness();
        h.manager.initialize(&catalog()).await;

        assert!(matches!(h.manager.resolve("coin"), SoundResolution::Pooled(_)));
        assert!(matches!(h.manager.resolve("land"), SoundResolution::Catalog(_)));
        assert!(matches!(h.manager.resolve("fireball"), SoundResolution::Missing));
        assert!(h.manager.resolve("fireball").sound().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_muted_sound_is_skipped() {
        let h = harness();
        h.manager.initialize(&catalog()).await;

        h.manager
            .update_settings(AudioSettingsPatch::default().with_sfx_muted(true));
        let outcome = h
            .manager
            .try_play_sound("land", SoundRequest::default())
            .await
            .expect("muted is not an error");
        assert_eq!(outcome, PlayOutcome::Muted);

        h.manager.update_settings(
            AudioSettingsPatch::default()
                .with_sfx_muted(false)
                .with_muted(true),
        );
        h.manager.land().await;
        assert_eq!(h.backend.voices_for("assets/sfx/land.mp3")[0].start_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_sound_stops_catalog_and_pool() {
        let h = harness();
        h.manager.initialize(&catalog()).await;
        for _ in 0..3 {
            h.manager.jump().await;
        }
        assert_eq!(h.manager.pool("jump").expect("jump pool").playing_count(), 3);

        h.manager.stop_sound("jump");
        assert!(h
            .backend
            .voices_for("assets/sfx/jump.mp3")
            .iter()
            .all(|voice| !voice.is_playing()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_persist_and_reload() {
        let h = harness();
        h.manager.update_settings(
            AudioSettingsPatch::default()
                .with_master_volume(0.4)
                .with_music_muted(true),
        );

        let json = h.store.get(SETTINGS_KEY).expect("settings persisted");
        assert!(json.contains("\"masterVolume\":0.4"));

        let dyn_backend: Arc<dyn AudioBackend> = h.backend.clone();
        let dyn_store: Arc<dyn SettingsStore> = h.store.clone();
        let reloaded = AudioManager::new(dyn_backend, dyn_store, AudioManagerConfig::default());
        assert_eq!(reloaded.settings(), h.manager.settings());
        assert!(reloaded.music_player().is_muted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_music_uses_settings_composite() {
        let h = harness();
        let overworld = MusicTrack::new("overworld", "music/overworld.mp3");

        h.manager.play_music(&overworld).await;
        // music 0.5 × master 0.7
        let level = h.manager.music_player().current_level().expect("current track");
        assert!((level - 0.35).abs() < 1e-6);

        h.manager
            .update_settings(AudioSettingsPatch::default().with_music_muted(true));
        assert_eq!(h.manager.music_player().current_level(), Some(0.0));
        assert_eq!(h.manager.music_player().state(), MusicState::Playing);

        h.manager
            .update_settings(AudioSettingsPatch::default().with_music_muted(false));
        let level = h.manager.music_player().current_level().expect("current track");
        assert!((level - 0.35).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_music_transport() {
        let h = harness();
        let overworld = MusicTrack::new("overworld", "music/overworld.mp3");
        h.manager.play_music(&overworld).await;

        let started = tokio::time::Instant::now();
        h.manager.pause_music(false).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(h.manager.music_player().state(), MusicState::Paused);

        h.manager.resume_music(true).await;
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(h.manager.music_player().state(), MusicState::Playing);

        h.manager.stop_music(true).await;
        assert_eq!(h.manager.music_player().state(), MusicState::NoTrack);
        assert!(!h.backend.voices_for("music/overworld.mp3")[0].is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_music_failure_is_swallowed() {
        let h = harness_with(
            SilentBackend::new().with_missing("music/missing.mp3"),
            MemorySettingsStore::new(),
        );
        let missing = MusicTrack::new("missing", "music/missing.mp3");

        h.manager.play_music(&missing).await;
        assert!(h.manager.try_play_music(&missing).await.is_err());
        assert_eq!(h.manager.music_player().state(), MusicState::NoTrack);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sound_play_is_swallowed() {
        let h = harness_with(
            SilentBackend::new()
                .with_clip_length(None)
                .with_rejected("sfx/broken.mp3"),
            MemorySettingsStore::new(),
        );
        h.manager
            .initialize(&[SoundDefinition::new("broken", "sfx/broken.mp3")
                .with_options(SoundOptions::default().with_volume(0.5))])
            .await;

        assert!(matches!(
            h.manager.try_play_sound("broken", SoundRequest::default()).await,
            Err(AudioError::PlaybackFailed { .. })
        ));
        h.manager.play_sound("broken", SoundRequest::default()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_is_safe() {
        let h = harness();
        h.manager.initialize(&catalog()).await;
        h.manager.jump().await;
        h.manager
            .play_music(&MusicTrack::new("overworld", "music/overworld.mp3"))
            .await;

        h.manager.dispose();
        h.manager.dispose();

        assert!(h.manager.is_disposed());
        assert!(h.manager.loaded_sounds().is_empty());
        assert!(h.manager.music_player().is_disposed());
        assert!(h.backend.voices().iter().all(|voice| !voice.is_playing()));

        // Every later call is a quiet no-op.
        h.manager.jump().await;
        h.manager.play_music(&MusicTrack::new("castle", "music/castle.mp3")).await;
        h.manager.stop_music(true).await;
        h.manager.update_settings(AudioSettingsPatch::default().with_muted(true));
        assert_eq!(h.manager.initialize(&catalog()).await, 0);
        assert!(matches!(
            h.manager.try_play_sound("jump", SoundRequest::default()).await,
            Err(AudioError::Disposed(_))
        ));
        assert!(!h.manager.settings().muted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_manager_after_dispose() {
        let h = harness();
        h.manager.update_settings(AudioSettingsPatch::default().with_sfx_volume(0.3));
        h.manager.dispose();

        let dyn_backend: Arc<dyn AudioBackend> = h.backend.clone();
        let dyn_store: Arc<dyn SettingsStore> = h.store.clone();
        let fresh = AudioManager::new(dyn_backend, dyn_store, AudioManagerConfig::default());

        assert!(!fresh.is_disposed());
        assert_eq!(fresh.settings().sfx_volume, 0.3);
        assert_eq!(
            fresh
                .initialize(&[SoundDefinition::new(
                    "jump",
                    SoundSource::from("assets/sfx/jump.mp3")
                )])
                .await,
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_convenience_methods_hit_their_sounds() {
        let h = harness();
        h.manager.initialize(&catalog()).await;

        h.manager.land().await;
        h.manager.death().await;
        h.manager.power_up().await;
        h.manager.extra_life().await;
        h.manager.stomp_enemy().await;
        h.manager.defeat_enemy().await;
        h.manager.break_block().await;
        h.manager.bump_block().await;
        h.manager.enter_pipe().await;
        h.manager.menu_select().await;
        h.manager.menu_confirm().await;
        h.manager.pause_game().await;
        h.manager.level_start().await;
        h.manager.level_complete().await;
        h.manager.game_over().await;

        for effect in SoundEffect::all() {
            if matches!(effect, SoundEffect::Jump | SoundEffect::Coin) {
                continue;
            }
            let started: u32 = h
                .backend
                .voices_for(&format!("assets/sfx/{}", effect.file_name()))
                .iter()
                .map(|voice| voice.start_count())
                .sum();
            assert_eq!(started, 1, "{effect} should have played once");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_definitions_load_once() {
        let h = harness();
        let loaded = h
            .manager
            .initialize(&[
                SoundDefinition::new("coin", "sfx/coin.mp3"),
                SoundDefinition::new("coin", "sfx/coin_alt.mp3"),
                SoundDefinition::new("zap", "sfx/zap.mp3"),
            ])
            .await;

        assert_eq!(loaded, 2);
        assert_eq!(h.backend.open_count("sfx/coin_alt.mp3"), 0);
        // One catalog voice plus one pool of three.
        assert_eq!(h.backend.voices_for("sfx/coin.mp3").len(), 4);
        assert_eq!(h.manager.pool("coin").expect("coin pool").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pool_falls_back_to_catalog() {
        let h = harness_with(
            SilentBackend::new()
                .with_clip_length(None)
                .with_open_limit("assets/sfx/coin.mp3", 2),
            MemorySettingsStore::new(),
        );
        h.manager.initialize(&catalog()).await;

        assert!(h.manager.is_sound_loaded("coin"));
        assert!(h.manager.pool("coin").is_none());
        assert!(matches!(h.manager.resolve("coin"), SoundResolution::Catalog(_)));

        h.manager.collect_coin().await;
        let voices = h.backend.voices_for("assets/sfx/coin.mp3");
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].start_count(), 1);
        assert_eq!(voices[1].start_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_music_fades_in_from_silence() {
        let h = harness();
        let overworld = MusicTrack::new("overworld", "music/overworld.mp3");
        h.manager.play_music(&overworld).await;

        h.manager.pause_music(true).await;
        assert_eq!(h.manager.music_player().current_level(), Some(0.0));

        // Settings changes while paused must not reach the voice.
        h.manager
            .update_settings(AudioSettingsPatch::default().with_music_volume(0.6));
        assert_eq!(h.manager.music_player().current_level(), Some(0.0));

        let voice = &h.backend.voices_for("music/overworld.mp3")[0];
        let before = voice.volume_history().len();
        h.manager.resume_music(true).await;

        let history = voice.volume_history();
        assert!(history[before..].windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(history[before], 0.0);
        // music 0.6 × master 0.7
        let level = h.manager.music_player().current_level().expect("current track");
        assert!((level - 0.42).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_music_transport_uses_track_fades() {
        let h = harness();
        let castle = MusicTrack::new("castle", "music/castle.mp3")
            .with_options(MusicOptions::default().with_fades(200, 400, 1000));
        h.manager.play_music(&castle).await;

        h.manager.pause_music(false).await;
        let started = tokio::time::Instant::now();
        h.manager.resume_music(true).await;
        let fade_in = started.elapsed();
        assert!(fade_in >= Duration::from_millis(190) && fade_in < Duration::from_millis(300));

        let started = tokio::time::Instant::now();
        h.manager.stop_music(true).await;
        let fade_out = started.elapsed();
        assert!(fade_out >= Duration::from_millis(390) && fade_out < Duration::from_millis(500));
        assert_eq!(h.manager.music_player().state(), MusicState::NoTrack);
    }
}
