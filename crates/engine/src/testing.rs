use crate::browser::{ScriptError, ScriptHost};
use crate::sink::PresentationSink;
use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use nowplaying_overlay_core::PlaybackStatus;
use nowplaying_overlay_providers::{
    AudioEndpoint, AudioError, EventSender, MediaProperties, MediaSession, SessionError,
    SessionEvent, SessionHandle, SessionKey, SessionProvider, Subscription, Timeline,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([200u8, 40, 90]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub struct FakeSession {
    key: usize,
    source: String,
    status: Mutex<PlaybackStatus>,
    props: Mutex<MediaProperties>,
    timeline: Mutex<Timeline>,
    thumbnail: Mutex<Option<Vec<u8>>>,
    failing: bool,
    gate: Option<Arc<Semaphore>>,
    journal: Journal,
    events: Mutex<Option<EventSender>>,
    pub thumbnail_calls: AtomicUsize,
    pub property_calls: AtomicUsize,
}

impl FakeSession {
    pub fn new(key: usize, source: &str) -> Self {
        Self {
            key,
            source: source.to_string(),
            status: Mutex::new(PlaybackStatus::Paused),
            props: Mutex::new(MediaProperties::default()),
            timeline: Mutex::new(Timeline::default()),
            thumbnail: Mutex::new(None),
            failing: false,
            gate: None,
            journal: journal(),
            events: Mutex::new(None),
            thumbnail_calls: AtomicUsize::new(0),
            property_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_status(self, status: PlaybackStatus) -> Self {
        *self.status.lock().unwrap() = status;
        self
    }

    pub fn with_track(self, title: &str, artist: &str, album: &str) -> Self {
        self.set_track(title, artist, album);
        self
    }

    pub fn with_timeline(self, position_ms: u64, duration_ms: u64) -> Self {
        *self.timeline.lock().unwrap() = Timeline {
            position_ms,
            duration_ms,
        };
        self
    }

    pub fn with_thumbnail(self, bytes: Vec<u8>) -> Self {
        *self.thumbnail.lock().unwrap() = Some(bytes);
        self
    }

    pub fn failing_queries(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn set_track(&self, title: &str, artist: &str, album: &str) {
        *self.props.lock().unwrap() = MediaProperties {
            title: title.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
        };
    }

    pub fn set_status(&self, status: PlaybackStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn emit(&self, event: SessionEvent) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    fn fault(&self) -> Result<(), SessionError> {
        if self.failing {
            Err(SessionError::Query("injected fault".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MediaSession for FakeSession {
    fn key(&self) -> SessionKey {
        SessionKey(self.key)
    }

    fn source_app_id(&self) -> Result<String, SessionError> {
        self.fault()?;
        Ok(self.source.clone())
    }

    fn playback_status(&self) -> Result<PlaybackStatus, SessionError> {
        self.fault()?;
        Ok(*self.status.lock().unwrap())
    }

    fn timeline(&self) -> Result<Timeline, SessionError> {
        self.fault()?;
        Ok(*self.timeline.lock().unwrap())
    }

    async fn media_properties(&self) -> Result<MediaProperties, SessionError> {
        self.property_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        self.fault()?;
        Ok(self.props.lock().unwrap().clone())
    }

    async fn thumbnail(&self) -> Result<Option<Vec<u8>>, SessionError> {
        self.thumbnail_calls.fetch_add(1, Ordering::SeqCst);
        self.fault()?;
        Ok(self.thumbnail.lock().unwrap().clone())
    }

    fn subscribe(&self, events: EventSender) -> Result<Subscription, SessionError> {
        *self.events.lock().unwrap() = Some(events);
        self.journal
            .lock()
            .unwrap()
            .push(format!("subscribe:{}", self.key));
        let journal = self.journal.clone();
        let key = self.key;
        Ok(Subscription::new(move || {
            journal.lock().unwrap().push(format!("unsubscribe:{key}"));
        }))
    }
}

pub struct FakeProvider {
    sessions: Mutex<Vec<SessionHandle>>,
    journal: Journal,
    failing: AtomicBool,
    events: Mutex<Option<EventSender>>,
}

impl FakeProvider {
    pub fn new(sessions: Vec<SessionHandle>) -> Self {
        Self {
            sessions: Mutex::new(sessions),
            journal: journal(),
            failing: AtomicBool::new(false),
            events: Mutex::new(None),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn set_sessions(&self, sessions: Vec<SessionHandle>) {
        *self.sessions.lock().unwrap() = sessions;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn emit(&self, event: SessionEvent) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

impl SessionProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn sessions(&self) -> Result<Vec<SessionHandle>, SessionError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SessionError::ManagerUnavailable("injected".to_string()));
        }
        Ok(self.sessions.lock().unwrap().clone())
    }

    fn current_session(&self) -> Option<SessionHandle> {
        self.sessions.lock().unwrap().first().cloned()
    }

    fn watch(&self, events: EventSender) -> Result<Subscription, SessionError> {
        *self.events.lock().unwrap() = Some(events);
        self.journal.lock().unwrap().push("watch".to_string());
        let journal = self.journal.clone();
        Ok(Subscription::new(move || {
            journal.lock().unwrap().push("unwatch".to_string());
        }))
    }
}

#[derive(Clone)]
pub struct FakeEndpoint {
    pub level: Arc<Mutex<f32>>,
    pub fail_activate: bool,
    pub fail_reads: Arc<AtomicBool>,
}

impl FakeEndpoint {
    pub fn new(level: f32) -> Self {
        Self {
            level: Arc::new(Mutex::new(level)),
            fail_activate: false,
            fail_reads: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_level(&self, level: f32) {
        *self.level.lock().unwrap() = level;
    }
}

impl AudioEndpoint for FakeEndpoint {
    fn activate(&mut self) -> Result<(), AudioError> {
        if self.fail_activate {
            return Err(AudioError::Unavailable("no device".to_string()));
        }
        Ok(())
    }

    fn master_scalar(&self) -> Result<f32, AudioError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AudioError::Unavailable("device lost".to_string()));
        }
        Ok(*self.level.lock().unwrap())
    }
}

pub struct FakeScriptHost {
    url: Mutex<Result<String, ()>>,
    result: Mutex<Result<String, ()>>,
    pub evaluations: AtomicUsize,
}

impl FakeScriptHost {
    pub fn new(url: &str, result: &str) -> Self {
        Self {
            url: Mutex::new(Ok(url.to_string())),
            result: Mutex::new(Ok(result.to_string())),
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn set_result(&self, result: Result<&str, ()>) {
        *self.result.lock().unwrap() = result.map(str::to_string);
    }

    pub fn set_url(&self, url: Result<&str, ()>) {
        *self.url.lock().unwrap() = url.map(str::to_string);
    }
}

#[async_trait]
impl ScriptHost for FakeScriptHost {
    async fn current_url(&self) -> Result<String, ScriptError> {
        self.url
            .lock()
            .unwrap()
            .clone()
            .map_err(|_| ScriptError::NotConnected)
    }

    async fn evaluate(&self, _script: &str) -> Result<String, ScriptError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        self.result
            .lock()
            .unwrap()
            .clone()
            .map_err(|_| ScriptError::Failed("script threw".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn last_json(&self) -> serde_json::Value {
        let last = self.messages.lock().unwrap().last().cloned().unwrap();
        serde_json::from_str(&last).unwrap()
    }
}

impl PresentationSink for RecordingSink {
    fn post(&self, message: String) {
        self.messages.lock().unwrap().push(message);
    }
}
