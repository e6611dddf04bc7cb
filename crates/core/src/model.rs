use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

pub const NO_PLAYING_TITLE: &str = "No playing";

pub const VOLUME_UNKNOWN: i32 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
    Other,
}

impl PlaybackStatus {
    pub fn is_playing(self) -> bool {
        self == PlaybackStatus::Playing
    }
}

/// Kept as a structured tuple so that a `|` inside a title can never make two
/// different tracks collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackIdentity {
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl TrackIdentity {
    pub fn new(title: &str, artist: &str, album: &str) -> Self {
        Self {
            title: title.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub position_ms: u64,
    pub last_updated_ms: u64,
    pub is_playing: bool,
    pub album_art: String,
    pub volume_percent: i32,
}

impl MediaPayload {
    pub fn no_playing(volume_percent: i32) -> Self {
        Self {
            title: NO_PLAYING_TITLE.to_string(),
            artist: String::new(),
            album: String::new(),
            duration_ms: 0,
            position_ms: 0,
            last_updated_ms: epoch_millis(SystemTime::now()),
            is_playing: false,
            album_art: String::new(),
            volume_percent,
        }
    }

    fn hash_content<H: Hasher>(&self, hasher: &mut H) {
        // last_updated_ms is a construction timestamp, not content.
        self.title.hash(hasher);
        self.artist.hash(hasher);
        self.album.hash(hasher);
        self.duration_ms.hash(hasher);
        self.position_ms.hash(hasher);
        self.is_playing.hash(hasher);
        self.album_art.hash(hasher);
        self.volume_percent.hash(hasher);
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OutboundMessage {
    Full(MediaPayload),
    NoPlaying(MediaPayload),
    #[serde(rename_all = "camelCase")]
    VolumeDelta {
        volume_percent: i32,
    },
}

impl OutboundMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match self {
            OutboundMessage::Full(p) => {
                0u8.hash(&mut hasher);
                p.hash_content(&mut hasher);
            }
            OutboundMessage::NoPlaying(p) => {
                1u8.hash(&mut hasher);
                p.hash_content(&mut hasher);
            }
            OutboundMessage::VolumeDelta { volume_percent } => {
                2u8.hash(&mut hasher);
                volume_percent.hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

pub fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
