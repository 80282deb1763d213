//! Scripted transport and helpers for driving the client under a paused clock.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use task_progress_sync::{
    Frame, MemoryStore, PeerEnd, ProgressEvent, Socket, StaticToken, SyncConfig, SyncError,
    SyncResult, SyncStatus, TaskSyncClient, TokenSource, Transport,
};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Error;
use tokio::time::{timeout, Instant};

const WAIT_LIMIT: Duration = Duration::from_secs(600);

/// One call to `dial`.
#[derive(Debug, Clone)]
pub struct DialRecord {
    pub url: String,
    pub at: Instant,
}

#[derive(Default)]
struct Script {
    dials: Vec<DialRecord>,
    refuse_remaining: usize,
}

/// Transport whose sockets are driven by the test.
pub struct ScriptedTransport {
    script: Mutex<Script>,
    peers: mpsc::UnboundedSender<Peer>,
}

impl ScriptedTransport {
    pub fn new() -> (Arc<Self>, Peers) {
        let (peers, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            script: Mutex::new(Script::default()),
            peers,
        });
        (transport, Peers(rx))
    }

    /// Refuse the next `n` dials.
    pub fn refuse_next(&self, n: usize) {
        self.script.lock().refuse_remaining = n;
    }

    pub fn refuse_all(&self) {
        self.refuse_next(usize::MAX);
    }

    pub fn accept_all(&self) {
        self.refuse_next(0);
    }

    pub fn dials(&self) -> Vec<DialRecord> {
        self.script.lock().dials.clone()
    }

    pub fn dial_count(&self) -> usize {
        self.script.lock().dials.len()
    }

    /// Milliseconds between consecutive dials.
    pub fn dial_gaps_ms(&self) -> Vec<u64> {
        self.dials()
            .windows(2)
            .map(|pair| (pair[1].at - pair[0].at).as_millis() as u64)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn dial(&self, url: &str) -> SyncResult<Socket> {
        let refuse = {
            let mut script = self.script.lock();
            script.dials.push(DialRecord {
                url: url.to_string(),
                at: Instant::now(),
            });
            if script.refuse_remaining > 0 {
                script.refuse_remaining -= 1;
                true
            } else {
                false
            }
        };
        if refuse {
            return Err(SyncError::WebSocket(Error::Io(
                std::io::ErrorKind::ConnectionRefused.into(),
            )));
        }

        let (socket, end) = Socket::channel(32);
        let _ = self.peers.send(Peer { end });
        Ok(socket)
    }
}

/// Accepted sockets, in dial order.
pub struct Peers(mpsc::UnboundedReceiver<Peer>);

impl Peers {
    pub async fn next(&mut self) -> Peer {
        timeout(WAIT_LIMIT, self.0.recv())
            .await
            .expect("no socket accepted in time")
            .expect("transport dropped")
    }
}

/// Server side of one accepted socket.
pub struct Peer {
    end: PeerEnd,
}

impl Peer {
    pub async fn push(&self, raw: &str) {
        self.end
            .to_client
            .send(Frame::Text(raw.to_string()))
            .await
            .expect("client side of socket is gone");
    }

    pub async fn close(&self, code: u16, reason: &str) {
        let _ = self
            .end
            .to_client
            .send(Frame::Close {
                code,
                reason: reason.to_string(),
            })
            .await;
    }

    /// Next frame from the client; `None` once the client let go.
    pub async fn next_sent(&mut self) -> Option<Frame> {
        self.end.from_client.recv().await
    }
}

pub fn client(transport: Arc<ScriptedTransport>, store: Arc<MemoryStore>) -> TaskSyncClient {
    client_with_token(transport, store, Arc::new(StaticToken::new("tok")))
}

pub fn client_with_token(
    transport: Arc<ScriptedTransport>,
    store: Arc<MemoryStore>,
    tokens: Arc<dyn TokenSource>,
) -> TaskSyncClient {
    TaskSyncClient::with_transport(SyncConfig::default(), "p1", tokens, store, transport)
}

pub async fn wait_for_status(
    client: &TaskSyncClient,
    predicate: impl Fn(&SyncStatus) -> bool,
) -> SyncStatus {
    let mut status = client.watch_status();
    let reached = timeout(WAIT_LIMIT, status.wait_for(|s| predicate(s)))
        .await
        .expect("status not reached in time")
        .expect("client stopped");
    *reached
}

pub async fn wait_for_event(
    client: &TaskSyncClient,
    predicate: impl Fn(&ProgressEvent) -> bool,
) -> ProgressEvent {
    let mut last = client.watch_last_event();
    let reached = timeout(
        WAIT_LIMIT,
        last.wait_for(|e| e.as_ref().is_some_and(|e| predicate(e))),
    )
    .await
    .expect("event not applied in time")
    .expect("client stopped");
    reached.clone().expect("event present")
}

pub fn progress(task_id: &str, kind: &str, status: &str, progress: u8) -> String {
    format!(
        r#"{{"task_id":"{task_id}","type":"{kind}","status":"{status}","progress":{progress}}}"#
    )
}
