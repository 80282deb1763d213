//! Owned one-shot timer.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

/// A cancellable one-shot deadline.
///
/// Dropping or cancelling it disarms the timer; at most one deadline is
/// armed at a time.
#[derive(Debug, Default)]
pub(crate) struct OneShot {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl OneShot {
    pub(crate) fn arm(&mut self, after: Duration) {
        self.sleep = Some(Box::pin(sleep(after)));
    }

    /// Returns whether a deadline was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        self.sleep.take().is_some()
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|s| s.deadline())
    }

    /// Resolves when the armed deadline passes, then disarms. Pends forever
    /// while disarmed. Cancel safe.
    pub(crate) async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => pending().await,
        }
    }
}
