use async_trait::async_trait;
use nowplaying_overlay_core::{epoch_millis, MediaPayload};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("no page connected")]
    NotConnected,
    #[error("script timed out")]
    Timeout,
    #[error("script failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("malformed script result: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[async_trait]
pub trait ScriptHost: Send + Sync {
    async fn current_url(&self) -> Result<String, ScriptError>;
    async fn evaluate(&self, script: &str) -> Result<String, ScriptError>;
}

const EXTRACT_SCRIPT: &str = r#"
(() => {
  const video = document.querySelector('video');
  if (!video) return null;
  const heading = document.querySelector('h1.ytd-watch-metadata yt-formatted-string');
  const title = (heading && heading.textContent.trim()) ||
    document.title.replace(/ - YouTube$/, '').trim();
  const channel = document.querySelector('#channel-name a');
  let thumbnail = '';
  const imageSrc = document.querySelector('link[rel="image_src"]');
  if (imageSrc && imageSrc.href) {
    thumbnail = imageSrc.href;
  } else {
    const id = new URLSearchParams(location.search).get('v');
    if (id) thumbnail = `https://i.ytimg.com/vi/${id}/hqdefault.jpg`;
  }
  return {
    title: title,
    artist: channel ? channel.textContent.trim() : '',
    thumbnail: thumbnail,
    duration: video.duration,
    position: video.currentTime,
    playing: !video.paused && !video.ended,
    volume: video.volume
  };
})()
"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageMedia {
    title: Option<String>,
    artist: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    position: Option<f64>,
    playing: bool,
    volume: Option<f64>,
}

pub struct BrowserFallbackPoller {
    host: Arc<dyn ScriptHost>,
    domain: String,
}

impl BrowserFallbackPoller {
    pub fn new(host: Arc<dyn ScriptHost>, domain: impl Into<String>) -> Self {
        Self {
            host,
            domain: domain.into().trim().to_lowercase(),
        }
    }

    pub async fn poll_once(&self) -> Result<Option<MediaPayload>, BrowserError> {
        let url = self.host.current_url().await?;
        if !self.matches_domain(&url) {
            debug!(url = %url, "browser page outside fallback domain");
            return Ok(None);
        }

        let raw = self.host.evaluate(EXTRACT_SCRIPT).await?;
        let Some(media) = parse_result(&raw)? else {
            return Ok(None);
        };
        Ok(Some(normalize(media)))
    }

    fn matches_domain(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }
}

fn parse_result(raw: &str) -> Result<Option<PageMedia>, serde_json::Error> {
    let mut value: Value = serde_json::from_str(raw)?;
    // Web views hand back a JSON string when the script result was stringified.
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner)?;
    }
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some)
}

fn seconds_to_ms(seconds: Option<f64>) -> u64 {
    match seconds {
        Some(s) if s.is_finite() && s > 0.0 => (s * 1_000.0).round() as u64,
        _ => 0,
    }
}

fn normalize(media: PageMedia) -> MediaPayload {
    let non_empty = |s: Option<String>| s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let volume_percent = match media.volume {
        Some(v) if v.is_finite() => (v.clamp(0.0, 1.0) * 100.0).round() as i32,
        _ => nowplaying_overlay_core::VOLUME_UNKNOWN,
    };

    MediaPayload {
        title: non_empty(media.title).unwrap_or_else(|| "Unknown".to_string()),
        artist: non_empty(media.artist).unwrap_or_else(|| "YouTube".to_string()),
        album: String::new(),
        duration_ms: seconds_to_ms(media.duration),
        position_ms: seconds_to_ms(media.position),
        last_updated_ms: epoch_millis(SystemTime::now()),
        is_playing: media.playing,
        album_art: non_empty(media.thumbnail).unwrap_or_default(),
        volume_percent,
    }
}
