use crate::{
    EventSender, MediaProperties, MediaSession, SessionError, SessionEvent, SessionHandle,
    SessionKey, SessionProvider, Subscription, Timeline,
};
use async_trait::async_trait;
use nowplaying_overlay_core::PlaybackStatus;
use std::sync::Arc;
use windows::core::{IUnknown, Interface};
use windows::Foundation::TypedEventHandler;
use windows::Media::Control::{
    GlobalSystemMediaTransportControlsSession,
    GlobalSystemMediaTransportControlsSessionManager,
    GlobalSystemMediaTransportControlsSessionPlaybackStatus,
};
use windows::Storage::Streams::DataReader;

fn query_err(err: windows::core::Error) -> SessionError {
    SessionError::Query(err.message().to_string())
}

fn subscribe_err(err: windows::core::Error) -> SessionError {
    SessionError::Subscribe(err.message().to_string())
}

pub struct GsmtcProvider {
    manager: GlobalSystemMediaTransportControlsSessionManager,
}

impl GsmtcProvider {
    pub async fn request() -> Result<Self, SessionError> {
        let manager = GlobalSystemMediaTransportControlsSessionManager::RequestAsync()
            .map_err(|e| SessionError::ManagerUnavailable(e.message().to_string()))?
            .await
            .map_err(|e| SessionError::ManagerUnavailable(e.message().to_string()))?;
        Ok(Self { manager })
    }
}

impl SessionProvider for GsmtcProvider {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn sessions(&self) -> Result<Vec<SessionHandle>, SessionError> {
        let view = self.manager.GetSessions().map_err(query_err)?;
        let size = view.Size().map_err(query_err)?;
        let mut sessions: Vec<SessionHandle> = Vec::with_capacity(size as usize);
        for i in 0..size {
            match view.GetAt(i) {
                Ok(session) => sessions.push(Arc::new(GsmtcSession::new(session))),
                Err(err) => tracing::debug!(index = i, error = %err, "skipping unreadable session"),
            }
        }
        Ok(sessions)
    }

    fn current_session(&self) -> Option<SessionHandle> {
        self.manager
            .GetCurrentSession()
            .ok()
            .map(|s| Arc::new(GsmtcSession::new(s)) as SessionHandle)
    }

    fn watch(&self, events: EventSender) -> Result<Subscription, SessionError> {
        let tx = events.clone();
        let current_token = self
            .manager
            .CurrentSessionChanged(&TypedEventHandler::new(move |_, _| {
                let _ = tx.send(SessionEvent::CurrentSessionChanged);
                Ok(())
            }))
            .map_err(subscribe_err)?;

        let tx = events;
        let list_token = match self
            .manager
            .SessionsChanged(&TypedEventHandler::new(move |_, _| {
                let _ = tx.send(SessionEvent::SessionsChanged);
                Ok(())
            })) {
            Ok(token) => token,
            Err(err) => {
                let _ = self.manager.RemoveCurrentSessionChanged(current_token);
                return Err(subscribe_err(err));
            }
        };

        let manager = self.manager.clone();
        Ok(Subscription::new(move || {
            let _ = manager.RemoveCurrentSessionChanged(current_token);
            let _ = manager.RemoveSessionsChanged(list_token);
        }))
    }
}

pub struct GsmtcSession {
    session: GlobalSystemMediaTransportControlsSession,
    key: SessionKey,
}

impl GsmtcSession {
    fn new(session: GlobalSystemMediaTransportControlsSession) -> Self {
        // COM identity lives on IUnknown, not on the projected interface.
        let key = session
            .cast::<IUnknown>()
            .map(|unknown| unknown.as_raw() as usize)
            .unwrap_or_else(|_| session.as_raw() as usize);
        Self {
            session,
            key: SessionKey(key),
        }
    }
}

#[async_trait]
impl MediaSession for GsmtcSession {
    fn key(&self) -> SessionKey {
        self.key
    }

    fn source_app_id(&self) -> Result<String, SessionError> {
        Ok(self
            .session
            .SourceAppUserModelId()
            .map_err(query_err)?
            .to_string_lossy())
    }

    fn playback_status(&self) -> Result<PlaybackStatus, SessionError> {
        let status = self
            .session
            .GetPlaybackInfo()
            .and_then(|info| info.PlaybackStatus())
            .map_err(query_err)?;
        Ok(match status {
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Playing => {
                PlaybackStatus::Playing
            }
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Paused => {
                PlaybackStatus::Paused
            }
            GlobalSystemMediaTransportControlsSessionPlaybackStatus::Stopped => {
                PlaybackStatus::Stopped
            }
            _ => PlaybackStatus::Other,
        })
    }

    fn timeline(&self) -> Result<Timeline, SessionError> {
        let timeline = self.session.GetTimelineProperties().map_err(query_err)?;
        let start = timeline.StartTime().map_err(query_err)?.Duration;
        let end = timeline.EndTime().map_err(query_err)?.Duration;
        let position = timeline.Position().map_err(query_err)?.Duration;

        // TimeSpan ticks are 100ns.
        Ok(Timeline {
            position_ms: (position.max(0) as u64) / 10_000,
            duration_ms: ((end - start).max(0) as u64) / 10_000,
        })
    }

    async fn media_properties(&self) -> Result<MediaProperties, SessionError> {
        let props = self
            .session
            .TryGetMediaPropertiesAsync()
            .map_err(query_err)?
            .await
            .map_err(query_err)?;

        Ok(MediaProperties {
            title: props.Title().map(|s| s.to_string_lossy()).unwrap_or_default(),
            artist: props.Artist().map(|s| s.to_string_lossy()).unwrap_or_default(),
            album: props
                .AlbumTitle()
                .map(|s| s.to_string_lossy())
                .unwrap_or_default(),
        })
    }

    async fn thumbnail(&self) -> Result<Option<Vec<u8>>, SessionError> {
        // Stream interfaces are not Send; keep them out of scope across awaits.
        let open = {
            let props = self
                .session
                .TryGetMediaPropertiesAsync()
                .map_err(query_err)?
                .await
                .map_err(query_err)?;
            let Ok(reference) = props.Thumbnail() else {
                return Ok(None);
            };
            reference.OpenReadAsync().map_err(query_err)?
        };

        let (reader, size) = {
            let stream = open.await.map_err(query_err)?;
            let size = stream.Size().map_err(query_err)? as u32;
            if size == 0 {
                return Ok(None);
            }
            let input = stream.GetInputStreamAt(0).map_err(query_err)?;
            let reader = DataReader::CreateDataReader(&input).map_err(query_err)?;
            (reader, size)
        };

        reader
            .LoadAsync(size)
            .map_err(query_err)?
            .await
            .map_err(query_err)?;

        let mut buf = vec![0u8; size as usize];
        reader.ReadBytes(&mut buf).map_err(query_err)?;
        Ok(Some(buf))
    }

    fn subscribe(&self, events: EventSender) -> Result<Subscription, SessionError> {
        let tx = events.clone();
        let props_token = self
            .session
            .MediaPropertiesChanged(&TypedEventHandler::new(move |_, _| {
                let _ = tx.send(SessionEvent::MediaPropertiesChanged);
                Ok(())
            }))
            .map_err(subscribe_err)?;

        let tx = events.clone();
        let playback_token = match self
            .session
            .PlaybackInfoChanged(&TypedEventHandler::new(move |_, _| {
                let _ = tx.send(SessionEvent::PlaybackInfoChanged);
                Ok(())
            })) {
            Ok(token) => token,
            Err(err) => {
                let _ = self.session.RemoveMediaPropertiesChanged(props_token);
                return Err(subscribe_err(err));
            }
        };

        let tx = events;
        let timeline_token = match self
            .session
            .TimelinePropertiesChanged(&TypedEventHandler::new(move |_, _| {
                let _ = tx.send(SessionEvent::TimelinePropertiesChanged);
                Ok(())
            })) {
            Ok(token) => token,
            Err(err) => {
                let _ = self.session.RemoveMediaPropertiesChanged(props_token);
                let _ = self.session.RemovePlaybackInfoChanged(playback_token);
                return Err(subscribe_err(err));
            }
        };

        let session = self.session.clone();
        Ok(Subscription::new(move || {
            let _ = session.RemoveMediaPropertiesChanged(props_token);
            let _ = session.RemovePlaybackInfoChanged(playback_token);
            let _ = session.RemoveTimelinePropertiesChanged(timeline_token);
        }))
    }
}
