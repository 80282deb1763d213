//! Reconnection controller.
//!
//! Decides when to reopen after a socket closed on us, and owns the one
//! retry timer. Holds no socket itself; the caller performs the `open()`
//! once [`ReconnectController::retry_due`] resolves.

use crate::backoff::BackoffPolicy;
use crate::timer::OneShot;
use crate::SyncConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Aggregate status exposed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Not connected. `retry_at` is set while a reconnect is scheduled.
    Disconnected { retry_at: Option<Instant> },
    Connecting,
    Connected,
    /// Retries exhausted. Only `connect()` or a visibility regain leaves it.
    Failed,
    /// No access token was available when opening.
    MissingCredential,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Disconnected { retry_at: None }
    }
}

impl SyncStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, SyncStatus::Connected)
    }

    /// Connected or on the way there.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Connected | SyncStatus::Connecting)
    }
}

/// Retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectContext {
    pub attempts: u32,
    pub last_delay_ms: Option<u64>,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl ReconnectContext {
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            attempts: 0,
            last_delay_ms: None,
            max_attempts,
            backoff,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Outcome of an abnormal close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Retry number `attempt` (1-based) fires after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Retries exhausted, now `Failed`.
    GiveUp { attempts: u32 },
}

/// Reconnect state machine plus its retry timer.
#[derive(Debug)]
pub struct ReconnectController {
    context: ReconnectContext,
    status: SyncStatus,
    timer: OneShot,
}

impl ReconnectController {
    /// Controller starting in `Disconnected` with no retry scheduled.
    pub fn new(context: ReconnectContext) -> Self {
        Self {
            context,
            status: SyncStatus::default(),
            timer: OneShot::default(),
        }
    }

    /// Controller using the attempt ceiling and backoff from `config`.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(ReconnectContext::new(
            config.max_reconnect_attempts,
            config.backoff(),
        ))
    }

    /// Current status.
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Attempt counter and backoff settings.
    pub fn context(&self) -> &ReconnectContext {
        &self.context
    }

    /// Whether a retry timer is armed.
    pub fn retry_pending(&self) -> bool {
        self.timer.deadline().is_some()
    }

    /// An `open()` is being attempted.
    pub fn on_connecting(&mut self) {
        self.timer.cancel();
        self.status = SyncStatus::Connecting;
    }

    /// The socket opened; the retry budget is restored.
    pub fn on_opened(&mut self) {
        self.timer.cancel();
        self.context.attempts = 0;
        self.status = SyncStatus::Connected;
    }

    /// Deliberate teardown finished. No reconnect.
    pub fn on_closed_clean(&mut self) {
        self.timer.cancel();
        if !matches!(self.status, SyncStatus::Failed | SyncStatus::MissingCredential) {
            self.status = SyncStatus::Disconnected { retry_at: None };
        }
    }

    /// The socket closed on us. Schedules the next retry or gives up.
    pub fn on_closed_abnormal(&mut self) -> ReconnectDecision {
        if self.context.exhausted() {
            self.timer.cancel();
            self.status = SyncStatus::Failed;
            return ReconnectDecision::GiveUp {
                attempts: self.context.attempts,
            };
        }

        let delay_ms = self.context.backoff.delay_ms(self.context.attempts);
        let delay = Duration::from_millis(delay_ms);
        self.context.attempts += 1;
        self.context.last_delay_ms = Some(delay_ms);
        self.timer.arm(delay);
        self.status = SyncStatus::Disconnected {
            retry_at: self.timer.deadline(),
        };
        ReconnectDecision::Retry {
            attempt: self.context.attempts,
            delay,
        }
    }

    /// No credential to open with. Stops retrying until reset.
    pub fn on_missing_credential(&mut self) {
        self.timer.cancel();
        self.status = SyncStatus::MissingCredential;
    }

    /// Explicit user-driven restart: clear the budget and any pending retry.
    pub fn reset(&mut self) {
        self.timer.cancel();
        self.context.attempts = 0;
        self.context.last_delay_ms = None;
    }

    /// Drop any pending retry and report plain `Disconnected`.
    pub fn cancel(&mut self) {
        self.timer.cancel();
        self.status = SyncStatus::Disconnected { retry_at: None };
    }

    /// Whether a hidden-to-visible transition should reopen now.
    pub fn should_resume_on_visible(&self) -> bool {
        !self.status.is_active()
    }

    /// Resolves when the scheduled retry is due. Pends while none is
    /// scheduled. Cancel safe.
    pub async fn retry_due(&mut self) {
        self.timer.fired().await
    }
}
