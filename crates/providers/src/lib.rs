use async_trait::async_trait;
use nowplaying_overlay_core::PlaybackStatus;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("media session manager unavailable: {0}")]
    ManagerUnavailable(String),
    #[error("session query failed: {0}")]
    Query(String),
    #[error("session subscription failed: {0}")]
    Subscribe(String),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio endpoint unavailable: {0}")]
    Unavailable(String),
    #[error("audio endpoint not activated")]
    NotActivated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SessionsChanged,
    CurrentSessionChanged,
    MediaPropertiesChanged,
    PlaybackInfoChanged,
    TimelinePropertiesChanged,
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey(pub usize);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaProperties {
    pub title: String,
    pub artist: String,
    pub album: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeline {
    pub position_ms: u64,
    pub duration_ms: u64,
}

pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[async_trait]
pub trait MediaSession: Send + Sync {
    fn key(&self) -> SessionKey;
    fn source_app_id(&self) -> Result<String, SessionError>;
    fn playback_status(&self) -> Result<PlaybackStatus, SessionError>;
    fn timeline(&self) -> Result<Timeline, SessionError>;
    async fn media_properties(&self) -> Result<MediaProperties, SessionError>;
    async fn thumbnail(&self) -> Result<Option<Vec<u8>>, SessionError>;
    fn subscribe(&self, events: EventSender) -> Result<Subscription, SessionError>;
}

pub type SessionHandle = Arc<dyn MediaSession>;

pub trait SessionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn sessions(&self) -> Result<Vec<SessionHandle>, SessionError>;
    fn current_session(&self) -> Option<SessionHandle>;
    fn watch(&self, events: EventSender) -> Result<Subscription, SessionError>;
}

pub trait AudioEndpoint: Send + Sync {
    fn activate(&mut self) -> Result<(), AudioError>;
    fn master_scalar(&self) -> Result<f32, AudioError>;
}

pub struct NullProvider;

impl SessionProvider for NullProvider {
    fn name(&self) -> &'static str {
        "null"
    }

    fn sessions(&self) -> Result<Vec<SessionHandle>, SessionError> {
        Ok(Vec::new())
    }

    fn current_session(&self) -> Option<SessionHandle> {
        None
    }

    fn watch(&self, _events: EventSender) -> Result<Subscription, SessionError> {
        Ok(Subscription::noop())
    }
}

pub async fn session_provider() -> Arc<dyn SessionProvider> {
    match platform::session_provider().await {
        Some(Ok(provider)) => provider,
        Some(Err(err)) => {
            tracing::warn!(error = %err, "media session registry unavailable; nothing will be shown");
            Arc::new(NullProvider)
        }
        None => Arc::new(NullProvider),
    }
}

pub fn audio_endpoint() -> Option<Box<dyn AudioEndpoint>> {
    platform::audio_endpoint()
}

mod platform {
    use super::{AudioEndpoint, SessionError, SessionProvider};
    use std::sync::Arc;

    #[cfg(target_os = "windows")]
    pub async fn session_provider() -> Option<Result<Arc<dyn SessionProvider>, SessionError>> {
        Some(
            crate::windows::GsmtcProvider::request()
                .await
                .map(|p| Arc::new(p) as Arc<dyn SessionProvider>),
        )
    }

    #[cfg(not(target_os = "windows"))]
    pub async fn session_provider() -> Option<Result<Arc<dyn SessionProvider>, SessionError>> {
        None
    }

    #[cfg(target_os = "windows")]
    pub fn audio_endpoint() -> Option<Box<dyn AudioEndpoint>> {
        Some(Box::new(crate::wasapi::WasapiEndpoint::new()))
    }

    #[cfg(not(target_os = "windows"))]
    pub fn audio_endpoint() -> Option<Box<dyn AudioEndpoint>> {
        None
    }
}

#[cfg(target_os = "windows")]
mod wasapi;
#[cfg(target_os = "windows")]
mod windows;
