use serde::{Deserialize, Serialize};

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigIntervals {
    pub volume_poll_ms: u64,
    pub browser_poll_ms: u64,
    pub debounce_ms: u64,
    pub push_lock_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub file_watch_poll_ms: u64,
}

impl Default for ConfigIntervals {
    fn default() -> Self {
        Self {
            volume_poll_ms: 2_000,
            browser_poll_ms: 2_000,
            debounce_ms: 100,
            push_lock_timeout_ms: 100,
            shutdown_timeout_ms: 2_000,
            file_watch_poll_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumArtConfig {
    pub max_edge_px: u32,
    pub jpeg_quality: u8,
}

impl Default for AlbumArtConfig {
    fn default() -> Self {
        Self {
            max_edge_px: 300,
            jpeg_quality: 75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub enabled: bool,
    pub domain: String,
    pub script_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            domain: "youtube.com".to_string(),
            script_timeout_ms: 1_500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub listen: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:47800".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub log_level: String,
    pub accept_only_source: Option<String>,
    pub intervals: ConfigIntervals,
    pub album_art: AlbumArtConfig,
    pub browser: BrowserConfig,
    pub bridge: BridgeConfig,
}

impl AppConfig {
    pub fn source_filter(&self) -> Option<String> {
        self.accept_only_source
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            log_level: "info".to_string(),
            accept_only_source: None,
            intervals: ConfigIntervals::default(),
            album_art: AlbumArtConfig::default(),
            browser: BrowserConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}
