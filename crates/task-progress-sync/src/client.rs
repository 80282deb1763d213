//! Task sync client.

use crate::connection::Connection;
use crate::dispatcher::EventDispatcher;
use crate::driver::{Command, Driver, Outputs};
use crate::messages::ProgressEvent;
use crate::reconnect::SyncStatus;
use crate::store::ProgressSink;
use crate::token::TokenSource;
use crate::transport::{Transport, TungsteniteTransport};
use crate::SyncConfig;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Whether the view hosting the client is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Aggregate status changed.
    StatusChanged(SyncStatus),
    /// A progress event was applied to the store.
    Progress(ProgressEvent),
    /// Reconnect attempts exhausted. Sent once per failure.
    Fatal { attempts: u32, message: String },
}

/// Live task progress for one project.
///
/// All work happens on a background task spawned at construction, so the
/// client must be created inside a tokio runtime. Dropping the client stops
/// that task and closes the socket with a normal close code.
pub struct TaskSyncClient {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SyncStatus>,
    last_event: watch::Receiver<Option<ProgressEvent>>,
    event_tx: broadcast::Sender<SyncEvent>,
    driver: JoinHandle<()>,
}

impl TaskSyncClient {
    /// Create a client using the WebSocket transport.
    pub fn new(
        config: SyncConfig,
        project_id: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self::with_transport(
            config,
            project_id,
            tokens,
            sink,
            Arc::new(TungsteniteTransport::new()),
        )
    }

    /// Create a client with a custom transport.
    pub fn with_transport(
        config: SyncConfig,
        project_id: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        sink: Arc<dyn ProgressSink>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SyncStatus::default());
        let (last_event_tx, last_event) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(100);

        let connection = Connection::new(transport, config.close_grace());
        let driver = Driver::new(
            config,
            project_id.into(),
            tokens,
            connection,
            EventDispatcher::new(sink),
            Outputs {
                status: status_tx,
                last_event: last_event_tx,
                events: event_tx.clone(),
            },
        );
        let driver = tokio::spawn(driver.run(commands_rx));

        Self {
            commands,
            status,
            last_event,
            event_tx,
            driver,
        }
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Open the socket. No-op while connecting or connected; otherwise
    /// clears the retry budget and dials immediately.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Cancel any pending reconnect, stop the heartbeat, then close the
    /// socket with code 1000.
    pub async fn disconnect(&self) {
        let (done, rx) = oneshot::channel();
        if self.command(Command::Disconnect { done }) {
            let _ = rx.await;
        }
    }

    /// Send a text frame. `false` unless the socket is open.
    pub async fn send(&self, data: impl Into<String>) -> bool {
        let (sent, rx) = oneshot::channel();
        let command = Command::Send {
            payload: data.into(),
            sent,
        };
        if !self.command(command) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Serialize `value` as JSON and send it.
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(json).await,
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound message");
                false
            }
        }
    }

    /// Report view visibility. Becoming visible again reconnects at once
    /// unless already connected or connecting.
    pub fn set_visibility(&self, visibility: Visibility) {
        self.command(Command::SetVisibility(visibility));
    }

    /// Disconnect from the current project and connect to `project_id`.
    pub async fn switch_project(&self, project_id: impl Into<String>) {
        let (done, rx) = oneshot::channel();
        let command = Command::SwitchProject {
            project_id: project_id.into(),
            done,
        };
        if self.command(command) {
            let _ = rx.await;
        }
    }

    /// Current subscription status.
    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Whether the socket is open right now.
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Status receiver that observes every transition.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Most recently applied progress event.
    pub fn last_event(&self) -> Option<ProgressEvent> {
        self.last_event.borrow().clone()
    }

    /// Receiver for the most recently applied progress event.
    pub fn watch_last_event(&self) -> watch::Receiver<Option<ProgressEvent>> {
        self.last_event.clone()
    }

    /// Disconnect and wait for the background task to finish.
    pub async fn shutdown(self) {
        let Self {
            commands, driver, ..
        } = self;
        drop(commands);
        if let Err(e) = driver.await {
            warn!(error = %e, "task sync driver ended abnormally");
        }
    }

    fn command(&self, command: Command) -> bool {
        if self.commands.send(command).is_err() {
            debug!("task sync driver is gone");
            return false;
        }
        true
    }
}
