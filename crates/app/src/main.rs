use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nowplaying_overlay_bridge::{InboundSignal, OverlayBridge};
use nowplaying_overlay_core::{AppConfig, MediaPayload};
use nowplaying_overlay_engine::{
    select_best, BrowserFallbackPoller, EngineSettings, MediaDataProcessor, Orchestrator,
    OrchestratorParts, VolumeSampler,
};
use nowplaying_overlay_providers::{audio_endpoint, session_provider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "nowplaying-overlay",
    about = "Now Playing -> Orchestrator -> overlay page"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run,
    Status,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run);
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Status => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            status(&cfg).await
        }
        Commands::Run => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            run(cfg, cfg_path).await
        }
    }
}

async fn run(mut cfg: AppConfig, cfg_path: PathBuf) -> Result<()> {
    let (bridge, mut signals) = OverlayBridge::bind(
        &cfg.bridge.listen,
        Duration::from_millis(cfg.browser.script_timeout_ms),
    )
    .await
    .context("failed to start overlay bridge")?;
    let bridge = Arc::new(bridge);

    let provider = session_provider().await;
    let mut volume = VolumeSampler::new(audio_endpoint());
    volume.initialize();

    let browser = if cfg.browser.enabled {
        Some(BrowserFallbackPoller::new(
            bridge.clone(),
            cfg.browser.domain.clone(),
        ))
    } else {
        None
    };

    let orchestrator = Orchestrator::new(
        OrchestratorParts {
            provider,
            volume,
            sink: bridge.clone(),
            browser,
        },
        EngineSettings::from_app_config(&cfg),
    );
    let outcome = orchestrator.start().await;
    info!(addr = %bridge.local_addr(), ?outcome, "nowplaying-overlay started");

    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(4);
    spawn_reload_watchers(
        cfg_path.clone(),
        cfg.intervals.file_watch_poll_ms,
        reload_tx,
    )
    .await?;

    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Some(InboundSignal::Ready) => {
                    let outcome = orchestrator.presentation_ready().await;
                    debug!(?outcome, "overlay ready");
                }
                Some(InboundSignal::WidgetSettings(settings)) => {
                    debug!(%settings, "widget settings received");
                }
                Some(InboundSignal::ApplyPosition(position)) => {
                    info!(%position, "overlay position requested");
                }
                Some(InboundSignal::Other(raw)) => {
                    debug!(message = %raw, "unhandled overlay message");
                }
                None => {
                    warn!("overlay bridge stopped; shutting down");
                    break;
                }
            },
            msg = reload_rx.recv() => {
                if msg.is_some() {
                    match load_or_default(&cfg_path) {
                        Ok(new_cfg) => {
                            if new_cfg.bridge != cfg.bridge
                                || new_cfg.browser != cfg.browser
                                || new_cfg.album_art != cfg.album_art
                            {
                                warn!("bridge, browser and album art changes apply after restart");
                            }
                            cfg = new_cfg;
                            orchestrator.update_settings(EngineSettings::from_app_config(&cfg));
                            info!("configuration reloaded");
                        }
                        Err(err) => {
                            error!(error=%err, "failed to reload config");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    orchestrator.dispose().await;
    Ok(())
}

async fn status(cfg: &AppConfig) -> Result<()> {
    let provider = session_provider().await;
    let sessions = provider
        .sessions()
        .context("failed to enumerate media sessions")?;
    let filter = cfg.source_filter();

    println!("provider: {}", provider.name());
    println!("filter: {}", filter.as_deref().unwrap_or("<none>"));
    for (idx, session) in sessions.iter().enumerate() {
        let source = session
            .source_app_id()
            .unwrap_or_else(|_| "<unavailable>".to_string());
        match session.playback_status() {
            Ok(state) => println!("session[{idx}]: {source} ({state:?})"),
            Err(_) => println!("session[{idx}]: {source} (<unavailable>)"),
        }
    }
    if sessions.is_empty() {
        println!("session: <none>");
    }

    let mut volume = VolumeSampler::new(audio_endpoint());
    volume.initialize();
    let settings = EngineSettings::from_app_config(cfg);

    let payload = match select_best(&sessions, filter.as_deref()) {
        Some(session) => {
            let source = session.source_app_id().unwrap_or_default();
            println!("selected: {source}");
            MediaDataProcessor::new(settings.art)
                .process(session.as_ref(), volume.current_percent())
                .await
        }
        None => {
            println!("selected: <none>");
            MediaPayload::no_playing(volume.current_percent())
        }
    };
    print_payload(&payload);

    Ok(())
}

fn print_payload(payload: &MediaPayload) {
    println!("track: {} - {}", payload.artist, payload.title);
    if !payload.album.is_empty() {
        println!("album: {}", payload.album);
    }
    println!(
        "timeline: {}ms / {}ms ({})",
        payload.position_ms,
        payload.duration_ms,
        if payload.is_playing {
            "playing"
        } else {
            "not playing"
        }
    );
    println!("volume: {}", payload.volume_percent);
    if payload.album_art.is_empty() {
        println!("album art: <none>");
    } else {
        println!("album art: {} bytes inline", payload.album_art.len());
    }
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("nowplaying-overlay").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = read_config(path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn read_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

async fn spawn_reload_watchers(path: PathBuf, poll_ms: u64, tx: mpsc::Sender<()>) -> Result<()> {
    let tx_poll = tx.clone();
    tokio::spawn(async move {
        let mut known_mtime = file_mtime(&path);
        let sleep = Duration::from_millis(poll_ms.max(2_000));
        loop {
            tokio::time::sleep(sleep).await;
            let current = file_mtime(&path);
            if current.is_some() && current != known_mtime {
                known_mtime = current;
                if tx_poll.send(()).await.is_err() {
                    break;
                }
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let tx_hup = tx.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::hangup()) {
                while sig.recv().await.is_some() {
                    let _ = tx_hup.send(()).await;
                }
            }
        });
    }

    Ok(())
}

fn file_mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("NOWPLAYING_OVERLAY_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
    // Set but blank clears a filter from the file.
    if let Some(v) = var("NOWPLAYING_OVERLAY_ACCEPT_ONLY") {
        cfg.accept_only_source = Some(v);
    }
    if let Some(v) = var("NOWPLAYING_OVERLAY_LISTEN") {
        if !v.trim().is_empty() {
            cfg.bridge.listen = v.trim().to_string();
        }
    }
}
