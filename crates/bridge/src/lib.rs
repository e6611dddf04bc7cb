use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use nowplaying_overlay_engine::{PresentationSink, ScriptError, ScriptHost};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, trace, warn};

const SIGNAL_CAPACITY: usize = 64;

type Ws = WebSocketStream<TcpStream>;
type WsWriter = SplitSink<Ws, Message>;
type ScriptReply = oneshot::Sender<Result<String, ScriptError>>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to bind overlay bridge on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("overlay bridge has no local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundSignal {
    Ready,
    WidgetSettings(Value),
    ApplyPosition(String),
    Other(String),
}

#[derive(Debug, PartialEq)]
enum Inbound {
    Signal(InboundSignal),
    ScriptResult {
        id: u64,
        outcome: Result<String, String>,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

fn parse_inbound(text: &str) -> Option<Inbound> {
    let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
        return Some(Inbound::Signal(InboundSignal::Other(text.to_string())));
    };

    let signal = match envelope.kind.as_str() {
        "ready" => InboundSignal::Ready,
        "widgetSettings" => {
            if envelope.data.is_null() {
                return None;
            }
            InboundSignal::WidgetSettings(envelope.data)
        }
        "applyPositionNow" => {
            let position = envelope
                .data
                .get("popupPosition")
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())?;
            InboundSignal::ApplyPosition(position.to_string())
        }
        "scriptResult" => {
            let id = envelope.id?;
            let outcome = match envelope.error {
                Some(err) => Err(err),
                None => Ok(envelope.result.to_string()),
            };
            return Some(Inbound::ScriptResult { id, outcome });
        }
        _ => InboundSignal::Other(text.to_string()),
    };
    Some(Inbound::Signal(signal))
}

enum Command {
    Post(String),
    Evaluate {
        id: u64,
        script: String,
        reply: ScriptReply,
    },
}

enum ConnEvent {
    Connected(u64, WsWriter),
    Frame(u64, String),
    Closed(u64),
}

/// One page is served at a time; a new connection replaces the previous one.
/// Payloads are written as bare JSON text, script requests as
/// `{"type":"evaluate","id":..,"script":..}` answered by
/// `{"type":"scriptResult","id":..,"result":..}`.
pub struct OverlayBridge {
    commands: mpsc::UnboundedSender<Command>,
    local_addr: SocketAddr,
    script_timeout: Duration,
    next_id: AtomicU64,
}

impl OverlayBridge {
    pub async fn bind(
        addr: &str,
        script_timeout: Duration,
    ) -> Result<(Self, mpsc::Receiver<InboundSignal>), BridgeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BridgeError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(BridgeError::LocalAddr)?;
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (signals, signals_rx) = mpsc::channel(SIGNAL_CAPACITY);

        tokio::spawn(serve(listener, commands_rx, signals));
        info!(addr = %local_addr, "overlay bridge listening");

        Ok((
            Self {
                commands,
                local_addr,
                script_timeout,
                next_id: AtomicU64::new(1),
            },
            signals_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl PresentationSink for OverlayBridge {
    fn post(&self, message: String) {
        if self.commands.send(Command::Post(message)).is_err() {
            debug!("overlay bridge stopped; message dropped");
        }
    }
}

#[async_trait]
impl ScriptHost for OverlayBridge {
    async fn current_url(&self) -> Result<String, ScriptError> {
        let raw = self.evaluate("location.href").await?;
        serde_json::from_str::<String>(&raw).map_err(|err| ScriptError::Failed(err.to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<String, ScriptError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Evaluate {
                id,
                script: script.to_string(),
                reply,
            })
            .map_err(|_| ScriptError::NotConnected)?;

        match tokio::time::timeout(self.script_timeout, response).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ScriptError::NotConnected),
            Err(_) => Err(ScriptError::Timeout),
        }
    }
}

struct Session {
    conn_id: u64,
    writer: WsWriter,
}

async fn serve(
    listener: TcpListener,
    mut commands: mpsc::UnboundedReceiver<Command>,
    signals: mpsc::Sender<InboundSignal>,
) {
    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
    let mut next_conn: u64 = 0;
    let mut current: Option<Session> = None;
    let mut pending: HashMap<u64, ScriptReply> = HashMap::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    next_conn += 1;
                    tokio::spawn(read_connection(next_conn, stream, peer, conn_tx.clone()));
                }
                Err(err) => warn!(error = %err, "overlay bridge accept failed"),
            },
            Some(event) = conn_rx.recv() => match event {
                ConnEvent::Connected(conn_id, writer) => {
                    if let Some(mut previous) = current.replace(Session { conn_id, writer }) {
                        debug!(conn_id = previous.conn_id, "replacing overlay connection");
                        let _ = previous.writer.close().await;
                    }
                    fail_pending(&mut pending);
                }
                ConnEvent::Frame(conn_id, text) => {
                    if current.as_ref().map(|s| s.conn_id) != Some(conn_id) {
                        continue;
                    }
                    match parse_inbound(&text) {
                        Some(Inbound::ScriptResult { id, outcome }) => {
                            if let Some(reply) = pending.remove(&id) {
                                let _ = reply.send(outcome.map_err(ScriptError::Failed));
                            }
                        }
                        Some(Inbound::Signal(signal)) => {
                            if signals.try_send(signal).is_err() {
                                debug!("inbound overlay signal dropped");
                            }
                        }
                        None => trace!("inbound overlay message ignored"),
                    }
                }
                ConnEvent::Closed(conn_id) => {
                    if current.as_ref().map(|s| s.conn_id) == Some(conn_id) {
                        info!(conn_id, "overlay disconnected");
                        current = None;
                        fail_pending(&mut pending);
                    }
                }
            },
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command::Post(text) => {
                        send_text(&mut current, text, &mut pending).await;
                    }
                    Command::Evaluate { id, script, reply } => {
                        if current.is_none() {
                            let _ = reply.send(Err(ScriptError::NotConnected));
                            continue;
                        }
                        pending.retain(|_, waiting| !waiting.is_closed());
                        pending.insert(id, reply);
                        let frame = json!({ "type": "evaluate", "id": id, "script": script });
                        send_text(&mut current, frame.to_string(), &mut pending).await;
                    }
                }
            }
        }
    }

    if let Some(mut session) = current.take() {
        let _ = session.writer.close().await;
    }
    debug!("overlay bridge stopped");
}

async fn send_text(
    current: &mut Option<Session>,
    text: String,
    pending: &mut HashMap<u64, ScriptReply>,
) {
    let Some(session) = current.as_mut() else {
        trace!("no overlay connected; message dropped");
        return;
    };
    if let Err(err) = session.writer.send(Message::Text(text)).await {
        warn!(error = %err, "overlay write failed; dropping connection");
        *current = None;
        fail_pending(pending);
    }
}

fn fail_pending(pending: &mut HashMap<u64, ScriptReply>) {
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(ScriptError::NotConnected));
    }
}

async fn read_connection(
    conn_id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<ConnEvent>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            debug!(%peer, error = %err, "overlay handshake failed");
            return;
        }
    };
    info!(conn_id, %peer, "overlay connected");

    let (writer, mut reader) = ws.split();
    if events.send(ConnEvent::Connected(conn_id, writer)).is_err() {
        return;
    }

    while let Some(msg) = reader.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bin)) => match String::from_utf8(bin) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!(conn_id, error = %err, "overlay read failed");
                break;
            }
        };
        if events.send(ConnEvent::Frame(conn_id, text)).is_err() {
            return;
        }
    }
    let _ = events.send(ConnEvent::Closed(conn_id));
}
