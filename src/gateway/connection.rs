//! Gateway connection lifecycle manager.
//!
//! Owns exactly one live session: handshake, heartbeat with
//! acknowledgement tracking, resume/identify decisions, and the fixed-delay
//! reconnect loop. Dispatch frames are forwarded over an mpsc channel; all
//! other opcodes are consumed here. The manager runs until `stop()`.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::frames::{self, GatewayFrame, Hello, Opcode, Ready};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingHandshake,
    Identifying,
    Resuming,
    Live,
}

/// A dispatch frame forwarded to the event loop.
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    pub kind: String,
    pub payload: serde_json::Value,
}

/// What the next handshake should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakePlan {
    Identify,
    Resume { session_id: String, last_seq: u64 },
}

/// Pure resume/identify bookkeeping, kept separate from the socket so the
/// reconnect-idempotence rules are unit-testable.
#[derive(Debug, Default)]
pub struct SessionTracker {
    session_id: Option<String>,
    resume_gateway_url: Option<String>,
    last_seq: Option<u64>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the sequence of an inbound dispatch frame.
    pub fn observe_sequence(&mut self, seq: u64) {
        self.last_seq = Some(seq);
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Capture session identity from the READY dispatch.
    pub fn mark_ready(&mut self, ready: &Ready) {
        self.session_id = Some(ready.session_id.clone());
        self.resume_gateway_url = Some(ready.resume_gateway_url.clone());
    }

    /// Drop the session entirely. The next handshake identifies fresh.
    pub fn invalidate(&mut self) {
        self.session_id = None;
        self.resume_gateway_url = None;
        self.last_seq = None;
    }

    /// Forget only the resume endpoint. The session itself stays held, so
    /// the next handshake still resumes, just over the configured gateway
    /// URL.
    pub fn drop_resume_url(&mut self) {
        self.resume_gateway_url = None;
    }

    /// Decide whether the next handshake resumes or identifies.
    pub fn handshake_plan(&self) -> HandshakePlan {
        match (&self.session_id, self.last_seq) {
            (Some(session_id), Some(last_seq)) => HandshakePlan::Resume {
                session_id: session_id.clone(),
                last_seq,
            },
            _ => HandshakePlan::Identify,
        }
    }

    /// URL for the next transport connect: the resume endpoint while a
    /// session is held, the configured gateway URL otherwise.
    pub fn connect_url(&self, default_url: &str) -> String {
        match &self.resume_gateway_url {
            Some(url) if self.session_id.is_some() => {
                if url.contains('?') {
                    url.clone()
                } else {
                    format!("{}/?v=10&encoding=json", url.trim_end_matches('/'))
                }
            }
            _ => default_url.to_string(),
        }
    }
}

/// Why a session ended, deciding what the reconnect loop does next.
#[derive(Debug)]
enum SessionEnd {
    /// `stop()` was called; do not reconnect.
    Stopped,
    /// Receiver side of the dispatch channel is gone; do not reconnect.
    ChannelClosed,
    /// Any disconnect cause; reconnect after the fixed delay.
    Disconnected(GatewayError),
}

fn transition(state: &mut ConnectionState, next: ConnectionState) {
    if *state != next {
        tracing::debug!(from = ?*state, to = ?next, "Connection state changed");
    }
    *state = next;
}

/// Handle to a running gateway task.
pub struct GatewayHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl GatewayHandle {
    /// Signal shutdown and wait for the connection task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

/// The gateway client: connects, keeps the session alive, reconnects.
pub struct GatewayClient {
    token: SecretString,
    gateway_url: String,
    reconnect_delay: Duration,
}

impl GatewayClient {
    pub fn new(config: &Config) -> Self {
        Self {
            token: config.token.clone(),
            gateway_url: config.gateway_url.clone(),
            reconnect_delay: config.reconnect_delay,
        }
    }

    /// Establish the session and keep it alive until `stop()`. Returns the
    /// handle and the dispatch-frame receiver.
    pub fn start(self) -> (GatewayHandle, mpsc::Receiver<DispatchEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(tx, shutdown_rx));
        (GatewayHandle { shutdown_tx, task }, rx)
    }

    async fn run(self, tx: mpsc::Sender<DispatchEvent>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut tracker = SessionTracker::new();
        loop {
            let url = tracker.connect_url(&self.gateway_url);
            tracing::info!(%url, "Connecting to gateway");
            let end = match connect_async(&url).await {
                Ok((ws, _response)) => {
                    self.drive_session(ws, &mut tracker, &tx, &mut shutdown_rx)
                        .await
                }
                Err(e) => {
                    // The resume endpoint can itself go away; the session is
                    // kept so the retry still resumes, over the configured
                    // URL instead.
                    tracing::warn!(%url, error = %e, "Gateway connect failed");
                    tracker.drop_resume_url();
                    SessionEnd::Disconnected(GatewayError::ConnectFailed {
                        url,
                        reason: e.to_string(),
                    })
                }
            };

            match end {
                SessionEnd::Stopped => {
                    tracing::info!("Gateway stopped");
                    return;
                }
                SessionEnd::ChannelClosed => {
                    tracing::info!("Dispatch receiver dropped, stopping gateway");
                    return;
                }
                SessionEnd::Disconnected(reason) => {
                    tracing::warn!(%reason, delay = ?self.reconnect_delay, "Gateway disconnected");
                }
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    /// Drive one transport connection from handshake to disconnect.
    async fn drive_session<S>(
        &self,
        ws: tokio_tungstenite::WebSocketStream<S>,
        tracker: &mut SessionTracker,
        tx: &mpsc::Sender<DispatchEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SessionEnd
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = ws.split();
        let mut state = ConnectionState::AwaitingHandshake;
        // The liveness timer only exists between Hello and disconnect;
        // dropping it on return cancels it.
        let mut heartbeat: Option<tokio::time::Interval> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Stopped;
                    }
                }
                _ = async { heartbeat.as_mut().expect("guarded").tick().await }, if heartbeat.is_some() => {
                    if !acked {
                        // Half-dead connection: the previous heartbeat was
                        // never acknowledged. Force a reconnect.
                        let _ = sink.send(Message::Close(None)).await;
                        let interval = heartbeat.as_ref().expect("guarded").period();
                        return SessionEnd::Disconnected(GatewayError::HeartbeatTimeout { interval });
                    }
                    let frame = frames::heartbeat(tracker.last_seq());
                    if let Err(e) = sink.send(Message::Text(frame.to_string().into())).await {
                        return SessionEnd::Disconnected(GatewayError::SendFailed(format!(
                            "heartbeat: {e}"
                        )));
                    }
                    acked = false;
                }
                inbound = stream.next() => {
                    let message = match inbound {
                        None => return SessionEnd::Disconnected(GatewayError::TransportClosed {
                            reason: "stream ended".to_string(),
                        }),
                        Some(Err(e)) => return SessionEnd::Disconnected(GatewayError::TransportClosed {
                            reason: e.to_string(),
                        }),
                        Some(Ok(message)) => message,
                    };
                    match message {
                        Message::Text(text) => {
                            let frame: GatewayFrame = match serde_json::from_str(&text) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    tracing::warn!(error = %e, "Dropping malformed gateway frame");
                                    continue;
                                }
                            };
                            match self
                                .handle_frame(frame, &mut state, &mut heartbeat, &mut acked, tracker, &mut sink, tx)
                                .await
                            {
                                FrameOutcome::Continue => {}
                                FrameOutcome::End(end) => return end,
                            }
                        }
                        Message::Ping(payload) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Message::Close(frame) => {
                            let reason = frame
                                .map(|f| format!("close code {}", f.code))
                                .unwrap_or_else(|| "close without frame".to_string());
                            return SessionEnd::Disconnected(GatewayError::TransportClosed { reason });
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_frame<W>(
        &self,
        frame: GatewayFrame,
        state: &mut ConnectionState,
        heartbeat: &mut Option<tokio::time::Interval>,
        acked: &mut bool,
        tracker: &mut SessionTracker,
        sink: &mut W,
        tx: &mpsc::Sender<DispatchEvent>,
    ) -> FrameOutcome
    where
        W: futures::Sink<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let Some(opcode) = frame.opcode() else {
            tracing::debug!(op = frame.op, "Ignoring unknown opcode");
            return FrameOutcome::Continue;
        };

        match opcode {
            Opcode::Hello => {
                let hello: Hello = match frame.d.and_then(|d| serde_json::from_value(d).ok()) {
                    Some(hello) => hello,
                    None => {
                        return FrameOutcome::End(SessionEnd::Disconnected(
                            GatewayError::MalformedFrame(
                                "hello frame missing heartbeat interval".to_string(),
                            ),
                        ));
                    }
                };
                let period = Duration::from_millis(hello.heartbeat_interval);
                // First heartbeat goes out after a random fraction of the
                // interval so reconnecting shards do not beat in lockstep.
                let first = period.mul_f64(rand::random::<f64>());
                let mut interval =
                    tokio::time::interval_at(tokio::time::Instant::now() + first, period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                *heartbeat = Some(interval);
                *acked = true;

                let handshake = match tracker.handshake_plan() {
                    HandshakePlan::Resume {
                        session_id,
                        last_seq,
                    } => {
                        transition(state, ConnectionState::Resuming);
                        tracing::info!(%session_id, last_seq, "Resuming session");
                        frames::resume(self.token.expose_secret(), &session_id, last_seq)
                    }
                    HandshakePlan::Identify => {
                        transition(state, ConnectionState::Identifying);
                        tracing::info!("Identifying with fresh session");
                        frames::identify(self.token.expose_secret())
                    }
                };
                if let Err(e) = sink.send(Message::Text(handshake.to_string().into())).await {
                    return FrameOutcome::End(SessionEnd::Disconnected(GatewayError::SendFailed(
                        format!("handshake: {e}"),
                    )));
                }
                FrameOutcome::Continue
            }
            Opcode::HeartbeatAck => {
                *acked = true;
                FrameOutcome::Continue
            }
            Opcode::Heartbeat => {
                // Immediate heartbeat on request.
                let beat = frames::heartbeat(tracker.last_seq());
                if let Err(e) = sink.send(Message::Text(beat.to_string().into())).await {
                    return FrameOutcome::End(SessionEnd::Disconnected(GatewayError::SendFailed(
                        format!("heartbeat: {e}"),
                    )));
                }
                FrameOutcome::Continue
            }
            Opcode::InvalidSession => {
                tracker.invalidate();
                FrameOutcome::End(SessionEnd::Disconnected(GatewayError::SessionInvalidated))
            }
            Opcode::Reconnect => {
                // Session identity is kept; the next handshake resumes.
                FrameOutcome::End(SessionEnd::Disconnected(GatewayError::ReconnectRequested))
            }
            Opcode::Dispatch => {
                if let Some(seq) = frame.s {
                    tracker.observe_sequence(seq);
                }
                let kind = frame.t.unwrap_or_default();
                match kind.as_str() {
                    "READY" => {
                        match frame.d.and_then(|d| serde_json::from_value::<Ready>(d).ok()) {
                            Some(ready) => {
                                tracker.mark_ready(&ready);
                                transition(state, ConnectionState::Live);
                                tracing::info!(session_id = %ready.session_id, "Gateway session live");
                            }
                            None => {
                                return FrameOutcome::End(SessionEnd::Disconnected(
                                    GatewayError::MalformedFrame(
                                        "ready dispatch missing session fields".to_string(),
                                    ),
                                ));
                            }
                        }
                        FrameOutcome::Continue
                    }
                    "RESUMED" => {
                        transition(state, ConnectionState::Live);
                        tracing::info!("Gateway session resumed");
                        FrameOutcome::Continue
                    }
                    _ => {
                        let event = DispatchEvent {
                            kind,
                            payload: frame.d.unwrap_or(serde_json::Value::Null),
                        };
                        if tx.send(event).await.is_err() {
                            return FrameOutcome::End(SessionEnd::ChannelClosed);
                        }
                        FrameOutcome::Continue
                    }
                }
            }
            Opcode::Identify | Opcode::Resume => {
                // Client-to-server opcodes; a server never sends these.
                tracing::debug!(?opcode, "Ignoring client-only opcode from server");
                FrameOutcome::Continue
            }
        }
    }
}

enum FrameOutcome {
    Continue,
    End(SessionEnd),
}
