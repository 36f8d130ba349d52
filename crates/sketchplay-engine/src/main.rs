//! # SketchPlay
//!
//! Composition root for the audio subsystem.
//!
//! Builds the backend (the default output device, or silent output when
//! none exists), creates the one `AudioManager`, loads the sound catalog and
//! runs a short playback sequence.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sketchplay_engine::{reference_catalog, AudioManager, AudioSettingsPatch, EngineConfig};
use sketchplay_kernel::audio_backend::{AudioBackend, AudioDevice};
use sketchplay_kernel::audio_silent::SilentBackend;
use sketchplay_kernel::synth::ToneSynth;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("sketchplay=info".parse()?))
        .init();

    info!("SketchPlay starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load();

    // The device must outlive every voice created from it.
    let device = match AudioDevice::new() {
        Ok(device) => Some(device),
        Err(e) => {
            warn!("{e}; continuing with silent output");
            None
        },
    };
    let backend: Arc<dyn AudioBackend> = match &device {
        Some(device) => Arc::new(device.backend()),
        None => Arc::new(SilentBackend::new().with_clip_length(Some(config.silent_clip()))),
    };

    let manager = Arc::new(AudioManager::new(
        backend,
        Arc::new(config.settings_store()),
        config.manager_config(),
    ));

    let synth = config
        .synth_placeholders
        .then(|| ToneSynth::new(config.sample_rate));
    let catalog = reference_catalog(&config.asset_dir, synth.as_ref());
    manager.initialize(&catalog).await;
    info!("Sounds ready: {}", manager.loaded_sounds().join(", "));

    run_demo(&manager, &config).await;

    manager.dispose();
    info!("SketchPlay shutdown complete");
    Ok(())
}

/// Short sequence exercising effects, music and settings.
async fn run_demo(manager: &AudioManager, config: &EngineConfig) {
    let tracks = config.music_tracks();

    manager.level_start().await;
    if let Some(first) = tracks.first() {
        manager.play_music(first).await;
    }

    for _ in 0..3 {
        manager.jump().await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        manager.collect_coin().await;
    }
    manager.stomp_enemy().await;
    manager.power_up().await;

    if let Some(second) = tracks.get(1) {
        manager.play_music(second).await;
    }

    let volume = manager.settings().music_volume;
    manager.update_settings(AudioSettingsPatch::default().with_music_volume(volume * 0.5));
    manager.pause_game().await;
    manager.pause_music(true).await;
    manager.resume_music(true).await;
    manager.update_settings(AudioSettingsPatch::default().with_music_volume(volume));

    manager.level_complete().await;
    manager.stop_music(true).await;
}
