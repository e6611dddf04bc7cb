use crate::art::ArtOptions;
use nowplaying_overlay_core::AppConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub accept_only_source: Option<String>,
    pub debounce: Duration,
    pub push_lock_timeout: Duration,
    pub volume_poll: Duration,
    pub browser_poll: Duration,
    pub shutdown_timeout: Duration,
    pub art: ArtOptions,
}

impl EngineSettings {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            accept_only_source: cfg.source_filter(),
            debounce: Duration::from_millis(cfg.intervals.debounce_ms),
            push_lock_timeout: Duration::from_millis(cfg.intervals.push_lock_timeout_ms),
            volume_poll: Duration::from_millis(cfg.intervals.volume_poll_ms.max(100)),
            browser_poll: Duration::from_millis(cfg.intervals.browser_poll_ms.max(100)),
            shutdown_timeout: Duration::from_millis(cfg.intervals.shutdown_timeout_ms),
            art: ArtOptions {
                max_edge: cfg.album_art.max_edge_px.max(1),
                jpeg_quality: cfg.album_art.jpeg_quality.clamp(1, 100),
            },
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}
