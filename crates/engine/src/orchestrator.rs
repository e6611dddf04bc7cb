use crate::browser::BrowserFallbackPoller;
use crate::processor::MediaDataProcessor;
use crate::selector::select_best;
use crate::settings::EngineSettings;
use crate::sink::{lock, PresentationSink, SinkGate};
use crate::volume::VolumeSampler;
use nowplaying_overlay_core::OutboundMessage;
use nowplaying_overlay_providers::{
    SessionEvent, SessionHandle, SessionKey, SessionProvider, Subscription,
};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Initial,
    Ready,
    Session(SessionEvent),
    BrowserTick,
}

impl Trigger {
    fn forces_delivery(self) -> bool {
        matches!(self, Trigger::Initial | Trigger::Ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Sent,
    Duplicate,
    Debounced,
    Busy,
    Skipped,
    Disposed,
}

#[derive(Debug, Default)]
pub struct Debouncer {
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub fn accept(&mut self, now: Instant, window: Duration) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < window {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

/// State mutated only while the push lock is held.
#[derive(Default)]
struct PushState {
    current: Option<SessionHandle>,
    subscription: Option<Subscription>,
    last_fingerprint: Option<u64>,
}

impl PushState {
    fn current_key(&self) -> Option<SessionKey> {
        self.current.as_ref().map(|s| s.key())
    }

    fn release_session(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.release();
        }
        self.current = None;
    }
}

pub struct OrchestratorParts {
    pub provider: Arc<dyn SessionProvider>,
    pub volume: VolumeSampler,
    pub sink: Arc<dyn PresentationSink>,
    pub browser: Option<BrowserFallbackPoller>,
}

struct Inner {
    provider: Arc<dyn SessionProvider>,
    processor: MediaDataProcessor,
    volume: VolumeSampler,
    browser: Option<BrowserFallbackPoller>,
    sink: SinkGate,
    settings: RwLock<EngineSettings>,
    push: tokio::sync::Mutex<PushState>,
    debounce: Mutex<Debouncer>,
    last_volume_sent: AtomicI32,
    disposed: AtomicBool,
    events: mpsc::UnboundedSender<SessionEvent>,
    registry_subscription: Mutex<Option<Subscription>>,
}

pub struct Orchestrator {
    inner: Arc<Inner>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl Orchestrator {
    pub fn new(parts: OrchestratorParts, settings: EngineSettings) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let inner = Inner {
            provider: parts.provider,
            processor: MediaDataProcessor::new(settings.art),
            volume: parts.volume,
            browser: parts.browser,
            sink: SinkGate::new(parts.sink),
            settings: RwLock::new(settings),
            push: tokio::sync::Mutex::new(PushState::default()),
            debounce: Mutex::new(Debouncer::default()),
            last_volume_sent: AtomicI32::new(i32::MIN),
            disposed: AtomicBool::new(false),
            events,
            registry_subscription: Mutex::new(None),
        };
        Self {
            inner: Arc::new(inner),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    pub async fn start(&self) -> PushOutcome {
        if self.inner.is_disposed() {
            return PushOutcome::Disposed;
        }

        match self.inner.provider.watch(self.inner.events.clone()) {
            Ok(sub) => *lock(&self.inner.registry_subscription) = Some(sub),
            Err(err) => warn!(error = %err, "cannot watch media session registry"),
        }

        {
            let events_rx = lock(&self.events_rx).take();
            let mut tasks = lock(&self.tasks);
            if let Some(rx) = events_rx {
                tasks.push(tokio::spawn(run_event_loop(
                    self.inner.clone(),
                    rx,
                    self.shutdown.subscribe(),
                )));
            }
            if self.inner.volume.is_ready() {
                tasks.push(tokio::spawn(run_volume_loop(
                    self.inner.clone(),
                    self.shutdown.subscribe(),
                )));
            }
            if self.inner.browser.is_some() {
                tasks.push(tokio::spawn(run_browser_loop(
                    self.inner.clone(),
                    self.shutdown.subscribe(),
                )));
            }
        }

        info!(provider = self.inner.provider.name(), "media orchestrator started");
        self.inner.push(Trigger::Initial).await
    }

    pub async fn presentation_ready(&self) -> PushOutcome {
        self.inner.push(Trigger::Ready).await
    }

    pub async fn handle_event(&self, event: SessionEvent) -> PushOutcome {
        self.inner.debounced_push(event).await
    }

    pub async fn browser_tick(&self) -> PushOutcome {
        self.inner.push(Trigger::BrowserTick).await
    }

    pub fn on_volume_changed(&self, percent: i32) -> bool {
        self.inner.on_volume_changed(percent)
    }

    pub fn update_settings(&self, settings: EngineSettings) {
        match self.inner.settings.write() {
            Ok(mut current) => *current = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    pub fn settings(&self) -> EngineSettings {
        self.inner.settings()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// No sink call happens after this returns. A push still in flight
    /// finishes as a no-op.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.sink.close();
        self.shutdown.send_replace(true);

        let timeout = self.inner.settings().shutdown_timeout;
        let handles: Vec<JoinHandle<()>> = lock(&self.tasks).drain(..).collect();
        for mut handle in handles {
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!("background task did not stop in time; aborting");
                handle.abort();
            }
        }

        lock(&self.inner.registry_subscription).take();
        match tokio::time::timeout(timeout, self.inner.push.lock()).await {
            Ok(mut state) => state.release_session(),
            Err(_) => debug!("push still in flight at dispose; it releases the session itself"),
        }
        info!("media orchestrator disposed");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.sink.close();
        self.shutdown.send_replace(true);
        for handle in lock(&self.tasks).drain(..) {
            handle.abort();
        }
    }
}

impl Inner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn settings(&self) -> EngineSettings {
        match self.settings.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn on_volume_changed(&self, percent: i32) -> bool {
        if self.is_disposed() {
            return false;
        }
        if self.last_volume_sent.swap(percent, Ordering::SeqCst) == percent {
            return false;
        }
        self.sink.deliver(&OutboundMessage::VolumeDelta {
            volume_percent: percent,
        })
    }

    async fn debounced_push(&self, event: SessionEvent) -> PushOutcome {
        if self.is_disposed() {
            return PushOutcome::Disposed;
        }
        let window = self.settings().debounce;
        if !lock(&self.debounce).accept(Instant::now(), window) {
            trace!(?event, "event inside debounce window; dropped");
            return PushOutcome::Debounced;
        }
        self.push(Trigger::Session(event)).await
    }

    async fn push(&self, trigger: Trigger) -> PushOutcome {
        if self.is_disposed() {
            return PushOutcome::Disposed;
        }
        let settings = self.settings();
        let mut state = match tokio::time::timeout(settings.push_lock_timeout, self.push.lock()).await
        {
            Ok(guard) => guard,
            Err(_) => {
                debug!(?trigger, "push already in flight; trigger dropped");
                return PushOutcome::Busy;
            }
        };
        if self.is_disposed() {
            state.release_session();
            return PushOutcome::Disposed;
        }

        if trigger.forces_delivery() {
            state.last_fingerprint = None;
        }

        let composed = self.compose(&mut state, &settings).await;
        if self.is_disposed() {
            state.release_session();
            return PushOutcome::Disposed;
        }
        let Some(message) = composed else {
            return PushOutcome::Skipped;
        };

        let fingerprint = message.fingerprint();
        if state.last_fingerprint == Some(fingerprint) {
            trace!(?trigger, "payload unchanged; not forwarded");
            return PushOutcome::Duplicate;
        }
        if !self.sink.deliver(&message) {
            state.release_session();
            return PushOutcome::Disposed;
        }
        state.last_fingerprint = Some(fingerprint);
        trace!(?trigger, "payload forwarded");
        PushOutcome::Sent
    }

    async fn compose(
        &self,
        state: &mut PushState,
        settings: &EngineSettings,
    ) -> Option<OutboundMessage> {
        let sessions = self.provider.sessions().unwrap_or_else(|err| {
            debug!(error = %err, "session enumeration failed");
            Vec::new()
        });
        let selected = select_best(&sessions, settings.accept_only_source.as_deref());
        self.track_session(state, selected.as_ref());

        let volume = self.volume.current_percent();
        match selected {
            Some(session) => Some(OutboundMessage::Full(
                self.processor.process(session.as_ref(), volume).await,
            )),
            None if sessions.is_empty() => self.browser_fallback(volume).await,
            None => Some(self.no_playing(volume)),
        }
    }

    fn no_playing(&self, volume: i32) -> OutboundMessage {
        OutboundMessage::NoPlaying(self.processor.no_playing(volume))
    }

    async fn browser_fallback(&self, volume: i32) -> Option<OutboundMessage> {
        let Some(browser) = &self.browser else {
            return Some(self.no_playing(volume));
        };
        match browser.poll_once().await {
            Ok(Some(payload)) => Some(OutboundMessage::Full(payload)),
            Ok(None) => Some(self.no_playing(volume)),
            Err(err) => {
                debug!(error = %err, "browser fallback unreadable this tick");
                None
            }
        }
    }

    fn track_session(&self, state: &mut PushState, selected: Option<&SessionHandle>) {
        if state.current_key() == selected.map(|s| s.key()) {
            return;
        }
        state.release_session();
        if self.is_disposed() {
            return;
        }

        let Some(session) = selected else {
            debug!("no session selected");
            return;
        };
        match session.subscribe(self.events.clone()) {
            Ok(sub) => state.subscription = Some(sub),
            Err(err) => warn!(error = %err, "cannot subscribe to session changes"),
        }
        if let Ok(source) = session.source_app_id() {
            debug!(source = %source, "tracking media session");
        }
        state.current = Some(session.clone());
    }
}

async fn run_event_loop(
    inner: Arc<Inner>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pushes = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                let inner = inner.clone();
                pushes.spawn(async move {
                    inner.debounced_push(event).await;
                });
            }
            Some(_) = pushes.join_next(), if !pushes.is_empty() => {}
        }
    }
    while pushes.join_next().await.is_some() {}
}

async fn run_volume_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let interval = inner.settings().volume_poll;
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {
                if let Some(percent) = inner.volume.poll_change() {
                    inner.on_volume_changed(percent);
                }
            }
        }
    }
}

async fn run_browser_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let interval = inner.settings().browser_poll;
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {
                if inner.provider.current_session().is_none() {
                    inner.push(Trigger::BrowserTick).await;
                }
            }
        }
    }
}
