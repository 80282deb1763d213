//! Sync client configuration.

use crate::backoff::BackoffPolicy;
use crate::{SyncError, SyncResult};
use std::time::Duration;
use url::Url;

/// Task sync client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// API base URL (e.g., https://api.storyflow.dev). `http`/`https` map
    /// to `ws`/`wss`.
    pub api_base_url: String,
    /// Interval between `ping` envelopes while connected.
    pub heartbeat_interval_ms: u64,
    /// Delay before the first reconnect attempt.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound on any reconnect delay.
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before entering `Failed`.
    pub max_reconnect_attempts: u32,
    /// How long a deliberate close waits for the peer's acknowledgement.
    pub close_grace_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            heartbeat_interval_ms: 30_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 5,
            close_grace_ms: 2_000,
        }
    }
}

impl SyncConfig {
    /// Heartbeat period as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// How long a deliberate close waits for the peer.
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// Backoff policy built from the delay bounds.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::from(self)
    }

    /// Build `{ws|wss}://{host}/api/v1/ws/tasks/{project_id}?token={token}`.
    ///
    /// Any path already on the base URL is kept as a prefix.
    pub fn task_socket_url(&self, project_id: &str, token: &str) -> SyncResult<Url> {
        let mut url = Url::parse(&self.api_base_url)?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(SyncError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|()| SyncError::UnsupportedScheme(scheme.to_string()))?;

        url.path_segments_mut()
            .map_err(|()| SyncError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["api", "v1", "ws", "tasks", project_id]);

        url.set_query(None);
        url.set_fragment(None);
        url.query_pairs_mut().append_pair("token", token);

        Ok(url)
    }
}
