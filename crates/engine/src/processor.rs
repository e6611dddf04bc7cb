use crate::art::{transcode_to_data_url, AlbumArtCache, ArtOptions};
use nowplaying_overlay_core::{epoch_millis, MediaPayload, TrackIdentity};
use nowplaying_overlay_providers::{MediaProperties, MediaSession, Timeline};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// The cache lock is held across the thumbnail fetch, so concurrent calls for
/// the same track fetch once and share the result.
pub struct MediaDataProcessor {
    options: ArtOptions,
    art: Mutex<AlbumArtCache>,
}

impl MediaDataProcessor {
    pub fn new(options: ArtOptions) -> Self {
        Self {
            options,
            art: Mutex::new(AlbumArtCache::default()),
        }
    }

    pub async fn process(&self, session: &dyn MediaSession, volume_percent: i32) -> MediaPayload {
        let props = session.media_properties().await.unwrap_or_else(|err| {
            debug!(error = %err, "media properties unavailable");
            MediaProperties::default()
        });
        let timeline = session.timeline().unwrap_or_else(|err| {
            debug!(error = %err, "timeline unavailable");
            Timeline::default()
        });
        let is_playing = match session.playback_status() {
            Ok(status) => status.is_playing(),
            Err(err) => {
                debug!(error = %err, "playback status unavailable");
                false
            }
        };

        let identity = TrackIdentity::new(&props.title, &props.artist, &props.album);
        let album_art = self.album_art(session, identity).await;

        MediaPayload {
            title: props.title,
            artist: props.artist,
            album: props.album,
            duration_ms: timeline.duration_ms,
            position_ms: timeline.position_ms,
            last_updated_ms: epoch_millis(SystemTime::now()),
            is_playing,
            album_art,
            volume_percent,
        }
    }

    pub fn no_playing(&self, volume_percent: i32) -> MediaPayload {
        MediaPayload::no_playing(volume_percent)
    }

    pub async fn clear_cache(&self) {
        self.art.lock().await.clear();
    }

    async fn album_art(&self, session: &dyn MediaSession, identity: TrackIdentity) -> String {
        let mut cache = self.art.lock().await;
        if let Some(art) = cache.get(&identity) {
            return art.unwrap_or_default();
        }

        let art = self.fetch_inline_art(session).await;
        cache.store(identity, art.clone());
        art.unwrap_or_default()
    }

    async fn fetch_inline_art(&self, session: &dyn MediaSession) -> Option<String> {
        let bytes = match session.thumbnail().await {
            Ok(Some(bytes)) if !bytes.is_empty() => bytes,
            Ok(_) => return None,
            Err(err) => {
                debug!(error = %err, "thumbnail fetch failed");
                return None;
            }
        };

        let options = self.options;
        match tokio::task::spawn_blocking(move || transcode_to_data_url(&bytes, options)).await {
            Ok(Ok(url)) => Some(url),
            Ok(Err(err)) => {
                debug!(error = %err, "thumbnail transcode failed");
                None
            }
            Err(err) => {
                warn!(error = %err, "thumbnail transcode task failed");
                None
            }
        }
    }
}
