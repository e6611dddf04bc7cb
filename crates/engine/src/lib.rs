mod art;
mod browser;
mod orchestrator;
mod processor;
mod selector;
mod settings;
mod sink;
mod volume;

#[cfg(test)]
mod testing;

pub use art::{transcode_to_data_url, AlbumArtCache, ArtError, ArtOptions};
pub use browser::{BrowserError, BrowserFallbackPoller, ScriptError, ScriptHost};
pub use orchestrator::{Debouncer, Orchestrator, OrchestratorParts, PushOutcome, Trigger};
pub use processor::MediaDataProcessor;
pub use selector::select_best;
pub use settings::EngineSettings;
pub use sink::PresentationSink;
pub use volume::VolumeSampler;
