use nowplaying_overlay_core::VOLUME_UNKNOWN;
use nowplaying_overlay_providers::AudioEndpoint;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, warn};

pub struct VolumeSampler {
    endpoint: Option<Box<dyn AudioEndpoint>>,
    ready: bool,
    last_reported: AtomicI32,
}

impl VolumeSampler {
    pub fn new(endpoint: Option<Box<dyn AudioEndpoint>>) -> Self {
        Self {
            endpoint,
            ready: false,
            last_reported: AtomicI32::new(VOLUME_UNKNOWN),
        }
    }

    pub fn initialize(&mut self) -> bool {
        let Some(endpoint) = self.endpoint.as_mut() else {
            warn!("no audio endpoint on this platform; volume reported as unknown");
            return false;
        };
        match endpoint.activate() {
            Ok(()) => {
                self.ready = true;
                true
            }
            Err(err) => {
                warn!(error = %err, "audio endpoint unavailable; volume reported as unknown");
                self.endpoint = None;
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn current_percent(&self) -> i32 {
        let Some(endpoint) = self.endpoint.as_ref().filter(|_| self.ready) else {
            return VOLUME_UNKNOWN;
        };
        match endpoint.master_scalar() {
            Ok(level) => to_percent(level),
            Err(err) => {
                debug!(error = %err, "volume query failed");
                VOLUME_UNKNOWN
            }
        }
    }

    pub fn poll_change(&self) -> Option<i32> {
        if !self.ready {
            return None;
        }
        let percent = self.current_percent();
        if percent == VOLUME_UNKNOWN {
            return None;
        }
        let previous = self.last_reported.swap(percent, Ordering::SeqCst);
        (previous != percent).then_some(percent)
    }
}

fn to_percent(level: f32) -> i32 {
    if !level.is_finite() {
        return VOLUME_UNKNOWN;
    }
    (level.clamp(0.0, 1.0) * 100.0).round() as i32
}
