//! Real-time task progress sync for StoryFlow projects.
//!
//! This crate provides:
//! - A per-project WebSocket subscription to generation task progress
//! - Automatic reconnection with capped exponential backoff
//! - Heartbeat pings while connected
//! - Idempotent application of progress events into a host-owned store
//!
//! [`TaskSyncClient`] is the entry point. Hosts plug in a [`TokenSource`]
//! for credentials and a [`ProgressSink`] that receives task and scene
//! updates.

mod backoff;
mod client;
mod config;
mod connection;
mod dispatcher;
mod driver;
mod error;
mod heartbeat;
mod messages;
mod reconnect;
mod store;
mod timer;
mod token;
mod transport;

pub use backoff::BackoffPolicy;
pub use client::{SyncEvent, TaskSyncClient, Visibility};
pub use config::SyncConfig;
pub use connection::{Connection, ConnectionEvent, ConnectionState, SocketSignal};
pub use dispatcher::{should_apply, AppliedState, DispatchOutcome, EventDispatcher};
pub use error::{SyncError, SyncResult};
pub use heartbeat::HeartbeatMonitor;
pub use messages::{
    ClientMessage, ControlKind, InboundMessage, MessageError, ProgressEvent, TaskKind, TaskStatus,
};
pub use reconnect::{ReconnectContext, ReconnectController, ReconnectDecision, SyncStatus};
pub use store::{
    MemoryStore, ProgressSink, SceneRecord, ScenePatch, SceneStatus, StoreError, TaskPatch,
    TaskRecord,
};
pub use token::{SharedToken, StaticToken, TokenSource};
pub use transport::{
    Frame, PeerEnd, Socket, Transport, TungsteniteTransport, CLOSE_ABNORMAL, CLOSE_NORMAL,
    CLOSE_NO_STATUS,
};
