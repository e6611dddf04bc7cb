use nowplaying_overlay_core::PlaybackStatus;
use nowplaying_overlay_providers::SessionHandle;
use tracing::trace;

pub fn select_best(sessions: &[SessionHandle], accept_only: Option<&str>) -> Option<SessionHandle> {
    if let Some(tag) = accept_only {
        let tag = tag.to_lowercase();
        return sessions
            .iter()
            .find(|s| matches_source(s, &tag))
            .cloned();
    }

    sessions
        .iter()
        .find(|s| is_playing(s))
        .or_else(|| sessions.first())
        .cloned()
}

fn matches_source(session: &SessionHandle, tag_lower: &str) -> bool {
    match session.source_app_id() {
        Ok(id) => id.to_lowercase().contains(tag_lower),
        Err(err) => {
            trace!(error = %err, "source id query failed; session skipped");
            false
        }
    }
}

fn is_playing(session: &SessionHandle) -> bool {
    match session.playback_status() {
        Ok(status) => status == PlaybackStatus::Playing,
        Err(err) => {
            trace!(error = %err, "playback status query failed; session skipped");
            false
        }
    }
}
