use nowplaying_overlay_core::OutboundMessage;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::error;

pub trait PresentationSink: Send + Sync {
    fn post(&self, message: String);
}

/// Sink wrapper that can be closed. Once [`SinkGate::close`] returns, no
/// further message reaches the sink.
pub(crate) struct SinkGate {
    sink: Mutex<Option<Arc<dyn PresentationSink>>>,
}

impl SinkGate {
    pub(crate) fn new(sink: Arc<dyn PresentationSink>) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
        }
    }

    pub(crate) fn deliver(&self, message: &OutboundMessage) -> bool {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(err) => {
                error!(error = %err, "failed to serialize outbound message");
                return false;
            }
        };
        match lock(&self.sink).as_ref() {
            Some(sink) => {
                sink.post(json);
                true
            }
            None => false,
        }
    }

    pub(crate) fn close(&self) {
        lock(&self.sink).take();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
