pub mod config;
pub mod model;

pub use config::{AlbumArtConfig, AppConfig, BridgeConfig, BrowserConfig, ConfigIntervals};
pub use model::{
    epoch_millis, MediaPayload, OutboundMessage, PlaybackStatus, TrackIdentity, NO_PLAYING_TITLE,
    VOLUME_UNKNOWN,
};
