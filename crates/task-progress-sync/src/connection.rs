//! Single-socket connection state machine.
//!
//! `Idle -> Connecting -> Open -> Closing -> Closed`. The connection never
//! blocks: dialing and reading happen in a pump task that reports back
//! through [`SocketSignal`]s, which the owner feeds to
//! [`Connection::handle_signal`]. Every `open()` starts a new generation and
//! signals from older generations are dropped.

use crate::timer::OneShot;
use crate::transport::{Frame, Socket, Transport, CLOSE_ABNORMAL};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use url::Url;

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// What happened on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    /// We asked to close and the close completed.
    ClosedClean { code: u16 },
    /// The socket went away without us asking.
    ClosedAbnormal { code: u16, reason: String },
    MessageReceived(String),
    TransportError(String),
}

/// Report from a socket pump task.
#[derive(Debug)]
pub struct SocketSignal {
    generation: u64,
    kind: SignalKind,
}

#[derive(Debug)]
enum SignalKind {
    Opened(mpsc::Sender<Frame>),
    DialFailed(String),
    Frame(Frame),
    Ended,
}

/// Owns at most one socket at a time.
pub struct Connection {
    transport: Arc<dyn Transport>,
    signals_tx: mpsc::Sender<SocketSignal>,
    state: ConnectionState,
    generation: u64,
    outbound: Option<mpsc::Sender<Frame>>,
    pump: Option<JoinHandle<()>>,
    close_grace: Duration,
    grace: OneShot,
    closing_code: u16,
}

impl Connection {
    /// Create an idle connection and the receiver its signals arrive on.
    pub fn new(
        transport: Arc<dyn Transport>,
        close_grace: Duration,
    ) -> (Self, mpsc::Receiver<SocketSignal>) {
        let (signals_tx, signals_rx) = mpsc::channel(100);
        (
            Self {
                transport,
                signals_tx,
                state: ConnectionState::Idle,
                generation: 0,
                outbound: None,
                pump: None,
                close_grace,
                grace: OneShot::default(),
                closing_code: 0,
            },
            signals_rx,
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Start dialing `url`. No-op while `Connecting` or `Open`.
    ///
    /// Returns whether a dial was started. A `Closing` socket is abandoned.
    pub fn open(&mut self, url: &Url) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                debug!(state = ?self.state, "open ignored, socket already active");
                return false;
            }
            ConnectionState::Closing => {
                debug!("abandoning closing socket for a new dial");
                self.teardown();
            }
            ConnectionState::Idle | ConnectionState::Closed => {}
        }

        self.generation += 1;
        self.state = ConnectionState::Connecting;
        debug!(
            generation = self.generation,
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            "dialing task socket"
        );

        self.pump = Some(tokio::spawn(pump(
            self.transport.clone(),
            url.to_string(),
            self.generation,
            self.signals_tx.clone(),
        )));
        true
    }

    /// Report an open that failed before dialing, e.g. an unusable URL.
    pub fn report_open_failure(&mut self, detail: String) -> Vec<ConnectionEvent> {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return Vec::new();
        }
        self.teardown();
        self.state = ConnectionState::Closed;
        vec![
            ConnectionEvent::TransportError(detail.clone()),
            ConnectionEvent::ClosedAbnormal {
                code: CLOSE_ABNORMAL,
                reason: detail,
            },
        ]
    }

    /// Hand `payload` to the transport. `false` unless `Open` or when the
    /// outbound buffer is full.
    pub fn send(&mut self, payload: String) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        let Some(outbound) = &self.outbound else {
            return false;
        };
        match outbound.try_send(Frame::Text(payload)) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to queue outbound frame");
                false
            }
        }
    }

    /// Close deliberately. Idempotent.
    ///
    /// An open socket moves to `Closing` and reports `ClosedClean` once the
    /// peer acknowledges or the grace period lapses. A pending dial is
    /// abandoned and reports `ClosedClean` right away.
    pub fn close(&mut self, code: u16, reason: &str) -> Vec<ConnectionEvent> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Closing | ConnectionState::Closed => {
                Vec::new()
            }
            ConnectionState::Connecting => {
                self.teardown();
                self.state = ConnectionState::Closed;
                vec![ConnectionEvent::ClosedClean { code }]
            }
            ConnectionState::Open => {
                if let Some(outbound) = &self.outbound {
                    let frame = Frame::Close {
                        code,
                        reason: reason.to_string(),
                    };
                    if let Err(e) = outbound.try_send(frame) {
                        debug!(error = %e, "close frame not queued");
                    }
                }
                self.state = ConnectionState::Closing;
                self.closing_code = code;
                self.grace.arm(self.close_grace);
                Vec::new()
            }
        }
    }

    /// Resolves when a close has waited out its grace period. Pends
    /// otherwise. Follow with [`Connection::grace_elapsed`].
    pub async fn close_grace_expired(&mut self) {
        self.grace.fired().await
    }

    /// Finish a close the peer never acknowledged.
    pub fn grace_elapsed(&mut self) -> Vec<ConnectionEvent> {
        if self.state != ConnectionState::Closing {
            return Vec::new();
        }
        debug!(generation = self.generation, "close not acknowledged in time");
        self.teardown();
        self.state = ConnectionState::Closed;
        vec![ConnectionEvent::ClosedClean {
            code: self.closing_code,
        }]
    }

    /// Apply a pump report.
    pub fn handle_signal(&mut self, signal: SocketSignal) -> Vec<ConnectionEvent> {
        if signal.generation != self.generation {
            trace!(
                generation = signal.generation,
                current = self.generation,
                "dropping signal from stale socket"
            );
            return Vec::new();
        }

        match signal.kind {
            SignalKind::Opened(outbound) => {
                if self.state != ConnectionState::Connecting {
                    return Vec::new();
                }
                self.outbound = Some(outbound);
                self.state = ConnectionState::Open;
                vec![ConnectionEvent::Opened]
            }
            SignalKind::DialFailed(detail) => {
                if self.state != ConnectionState::Connecting {
                    return Vec::new();
                }
                self.teardown();
                self.state = ConnectionState::Closed;
                vec![
                    ConnectionEvent::TransportError(detail.clone()),
                    ConnectionEvent::ClosedAbnormal {
                        code: CLOSE_ABNORMAL,
                        reason: detail,
                    },
                ]
            }
            SignalKind::Frame(Frame::Text(text)) => {
                if self.state == ConnectionState::Open {
                    vec![ConnectionEvent::MessageReceived(text)]
                } else {
                    Vec::new()
                }
            }
            SignalKind::Frame(Frame::Close { code, reason }) => self.finish(code, reason),
            SignalKind::Ended => self.finish(CLOSE_ABNORMAL, "socket ended".to_string()),
        }
    }

    fn finish(&mut self, code: u16, reason: String) -> Vec<ConnectionEvent> {
        let event = match self.state {
            ConnectionState::Closing => ConnectionEvent::ClosedClean { code },
            ConnectionState::Open | ConnectionState::Connecting => {
                ConnectionEvent::ClosedAbnormal { code, reason }
            }
            ConnectionState::Idle | ConnectionState::Closed => return Vec::new(),
        };
        self.teardown();
        self.state = ConnectionState::Closed;
        vec![event]
    }

    fn teardown(&mut self) {
        self.outbound = None;
        self.grace.cancel();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn pump(
    transport: Arc<dyn Transport>,
    url: String,
    generation: u64,
    signals: mpsc::Sender<SocketSignal>,
) {
    let signal = |kind: SignalKind| SocketSignal { generation, kind };

    let Socket {
        outbound,
        mut inbound,
    } = match transport.dial(&url).await {
        Ok(socket) => socket,
        Err(e) => {
            let _ = signals.send(signal(SignalKind::DialFailed(e.to_string()))).await;
            return;
        }
    };

    if signals.send(signal(SignalKind::Opened(outbound))).await.is_err() {
        return;
    }

    while let Some(frame) = inbound.recv().await {
        let is_close = matches!(frame, Frame::Close { .. });
        if signals.send(signal(SignalKind::Frame(frame))).await.is_err() || is_close {
            return;
        }
    }
    let _ = signals.send(signal(SignalKind::Ended)).await;
}
