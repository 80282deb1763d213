//! Liveness pings while a socket is open.

use crate::messages::ClientMessage;
use std::future::pending;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Periodic `{"type":"ping"}` ticker.
///
/// The ticker exists only between [`start`](Self::start) and
/// [`stop`](Self::stop). The first tick lands one full period after start.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    period: Duration,
    ticker: Option<Interval>,
}

impl HeartbeatMonitor {
    /// Stopped monitor that pings every `period` once started.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            ticker: None,
        }
    }

    /// Time between pings.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether ticks are being produced.
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Start ticking. Returns `false` if already running.
    pub fn start(&mut self) -> bool {
        if self.ticker.is_some() {
            return false;
        }
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        true
    }

    /// Stop ticking. Returns `false` if already stopped.
    pub fn stop(&mut self) -> bool {
        self.ticker.take().is_some()
    }

    /// Resolves on the next tick. Pends forever while stopped. Cancel safe.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => pending().await,
        }
    }

    /// Ping payload sent on each tick.
    pub fn ping_payload() -> String {
        ClientMessage::Ping
            .to_json()
            .unwrap_or_else(|_| r#"{"type":"ping"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_full_period() {
        let mut heartbeat = HeartbeatMonitor::new(Duration::from_secs(30));
        let start = Instant::now();
        assert!(heartbeat.start());

        assert!(timeout(Duration::from_millis(29_999), heartbeat.tick())
            .await
            .is_err());
        heartbeat.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(30));

        heartbeat.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_exactly_once() {
        let mut heartbeat = HeartbeatMonitor::new(Duration::from_secs(30));
        assert!(!heartbeat.stop());
        assert!(heartbeat.start());
        assert!(!heartbeat.start());
        assert!(heartbeat.is_running());
        assert!(heartbeat.stop());
        assert!(!heartbeat.stop());

        assert!(timeout(Duration::from_secs(300), heartbeat.tick())
            .await
            .is_err());
    }

    #[test]
    fn test_ping_payload() {
        assert_eq!(HeartbeatMonitor::ping_payload(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_zero_period_is_clamped() {
        let heartbeat = HeartbeatMonitor::new(Duration::ZERO);
        assert_eq!(heartbeat.period(), Duration::from_millis(1));
    }
}
