//! Background task owning the connection and its timers.

use crate::client::{SyncEvent, Visibility};
use crate::connection::{Connection, ConnectionEvent, ConnectionState, SocketSignal};
use crate::dispatcher::{DispatchOutcome, EventDispatcher};
use crate::heartbeat::HeartbeatMonitor;
use crate::messages::ProgressEvent;
use crate::reconnect::{ReconnectController, ReconnectDecision, SyncStatus};
use crate::token::TokenSource;
use crate::transport::CLOSE_NORMAL;
use crate::{SyncConfig, SyncError, SyncResult};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Requests from the facade.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect {
        done: oneshot::Sender<()>,
    },
    Send {
        payload: String,
        sent: oneshot::Sender<bool>,
    },
    SetVisibility(Visibility),
    SwitchProject {
        project_id: String,
        done: oneshot::Sender<()>,
    },
}

/// Outputs shared with the facade.
pub(crate) struct Outputs {
    pub(crate) status: watch::Sender<SyncStatus>,
    pub(crate) last_event: watch::Sender<Option<ProgressEvent>>,
    pub(crate) events: broadcast::Sender<SyncEvent>,
}

pub(crate) struct Driver {
    config: SyncConfig,
    project_id: String,
    tokens: Arc<dyn TokenSource>,
    connection: Connection,
    signals: mpsc::Receiver<SocketSignal>,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectController,
    dispatcher: EventDispatcher,
    visibility: Visibility,
    /// Set by `connect()`, cleared by `disconnect()`.
    wanted: bool,
    outputs: Outputs,
}

impl Driver {
    pub(crate) fn new(
        config: SyncConfig,
        project_id: String,
        tokens: Arc<dyn TokenSource>,
        connection: (Connection, mpsc::Receiver<SocketSignal>),
        dispatcher: EventDispatcher,
        outputs: Outputs,
    ) -> Self {
        let (connection, signals) = connection;
        Self {
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval()),
            reconnect: ReconnectController::from_config(&config),
            config,
            project_id,
            tokens,
            connection,
            signals,
            dispatcher,
            visibility: Visibility::Visible,
            wanted: false,
            outputs,
        }
    }

    /// Run until the facade is dropped, then close the socket cleanly.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(signal) = self.signals.recv() => {
                    let events = self.connection.handle_signal(signal);
                    self.handle_events(events);
                }
                _ = self.heartbeat.tick() => self.send_ping(),
                _ = self.reconnect.retry_due() => {
                    debug!(
                        project_id = %self.project_id,
                        attempt = self.reconnect.context().attempts,
                        "reconnect timer fired"
                    );
                    self.open_now();
                }
                _ = self.connection.close_grace_expired() => {
                    let events = self.connection.grace_elapsed();
                    self.handle_events(events);
                }
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        self.disconnect();
        while self.connection.state() == ConnectionState::Closing {
            tokio::select! {
                Some(signal) = self.signals.recv() => {
                    let events = self.connection.handle_signal(signal);
                    self.handle_events(events);
                }
                _ = self.connection.close_grace_expired() => {
                    let events = self.connection.grace_elapsed();
                    self.handle_events(events);
                }
            }
        }
        debug!(project_id = %self.project_id, "task sync driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect { done } => {
                self.disconnect();
                let _ = done.send(());
            }
            Command::Send { payload, sent } => {
                let _ = sent.send(self.connection.send(payload));
            }
            Command::SetVisibility(visibility) => self.set_visibility(visibility),
            Command::SwitchProject { project_id, done } => {
                info!(from = %self.project_id, to = %project_id, "switching project");
                self.disconnect();
                self.dispatcher.reset();
                self.outputs.last_event.send_replace(None);
                self.project_id = project_id;
                self.connect();
                let _ = done.send(());
            }
        }
    }

    fn connect(&mut self) {
        self.wanted = true;
        let status = self.reconnect.status();
        if status.is_active() {
            debug!(?status, "connect ignored, already active");
            return;
        }
        self.reconnect.reset();
        self.open_now();
    }

    /// Cancel the retry timer, then the heartbeat, then close the socket.
    fn disconnect(&mut self) {
        self.wanted = false;
        self.reconnect.cancel();
        self.heartbeat.stop();
        let events = self.connection.close(CLOSE_NORMAL, "client disconnect");
        self.handle_events(events);
        self.publish_status();
    }

    fn set_visibility(&mut self, visibility: Visibility) {
        let previous = std::mem::replace(&mut self.visibility, visibility);
        trace!(?previous, current = ?visibility, "visibility changed");

        let regained = previous == Visibility::Hidden && visibility == Visibility::Visible;
        if regained && self.wanted && self.reconnect.should_resume_on_visible() {
            info!(
                project_id = %self.project_id,
                status = ?self.reconnect.status(),
                "view visible again, reconnecting now"
            );
            self.reconnect.reset();
            self.open_now();
        }
    }

    fn socket_url(&self) -> SyncResult<Url> {
        let token = self
            .tokens
            .access_token()
            .ok_or(SyncError::MissingCredential)?;
        self.config.task_socket_url(&self.project_id, &token)
    }

    fn open_now(&mut self) {
        let url = match self.socket_url() {
            Err(SyncError::MissingCredential) => {
                warn!(project_id = %self.project_id, "no access token, task socket not opened");
                self.reconnect.on_missing_credential();
                self.publish_status();
                return;
            }
            other => other,
        };

        self.reconnect.on_connecting();
        self.publish_status();

        match url {
            Ok(url) => {
                info!(
                    project_id = %self.project_id,
                    attempt = self.reconnect.context().attempts,
                    "connecting to task progress socket"
                );
                self.connection.open(&url);
            }
            Err(e) => {
                error!(error = %e, api_base_url = %self.config.api_base_url, "cannot build task socket URL");
                let events = self.connection.report_open_failure(e.to_string());
                self.handle_events(events);
            }
        }
    }

    fn handle_events(&mut self, events: Vec<ConnectionEvent>) {
        for event in events {
            match event {
                ConnectionEvent::Opened => {
                    info!(project_id = %self.project_id, "task progress socket connected");
                    self.reconnect.on_opened();
                    self.heartbeat.start();
                    self.publish_status();
                }
                ConnectionEvent::ClosedClean { code } => {
                    info!(project_id = %self.project_id, code, "task progress socket closed");
                    self.heartbeat.stop();
                    self.reconnect.on_closed_clean();
                    self.publish_status();
                }
                ConnectionEvent::ClosedAbnormal { code, reason } => {
                    warn!(
                        project_id = %self.project_id,
                        code,
                        reason = %reason,
                        "task progress socket closed unexpectedly"
                    );
                    self.heartbeat.stop();
                    self.on_abnormal_close();
                }
                ConnectionEvent::MessageReceived(raw) => {
                    if let DispatchOutcome::Applied(event) = self.dispatcher.dispatch(&raw) {
                        self.outputs.last_event.send_replace(Some(event.clone()));
                        let _ = self.outputs.events.send(SyncEvent::Progress(event));
                    }
                }
                ConnectionEvent::TransportError(detail) => {
                    debug!(project_id = %self.project_id, detail = %detail, "transport error");
                }
            }
        }
    }

    fn on_abnormal_close(&mut self) {
        match self.reconnect.on_closed_abnormal() {
            ReconnectDecision::Retry { attempt, delay } => {
                info!(
                    project_id = %self.project_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                self.publish_status();
            }
            ReconnectDecision::GiveUp { attempts } => {
                error!(
                    project_id = %self.project_id,
                    attempts,
                    "task progress socket unavailable, giving up"
                );
                self.publish_status();
                let _ = self.outputs.events.send(SyncEvent::Fatal {
                    attempts,
                    message: format!(
                        "Lost connection to live task updates after {attempts} reconnect attempts"
                    ),
                });
            }
        }
    }

    fn send_ping(&mut self) {
        if self.connection.send(HeartbeatMonitor::ping_payload()) {
            trace!(project_id = %self.project_id, "heartbeat ping sent");
        } else {
            debug!(
                project_id = %self.project_id,
                "heartbeat ping skipped, send buffer unavailable"
            );
        }
    }

    fn publish_status(&mut self) {
        let status = self.reconnect.status();
        let changed = self.outputs.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            debug!(project_id = %self.project_id, ?status, "sync status changed");
            let _ = self.outputs.events.send(SyncEvent::StatusChanged(status));
        }
    }
}
