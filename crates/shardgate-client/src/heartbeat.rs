//! Heartbeat bookkeeping and timer
//!
//! [`HeartbeatState`] decides what a tick means; [`HeartbeatTimer`] produces
//! the ticks. The controller owns both and is the only one writing heartbeats.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Unacknowledged heartbeats tolerated before a tick counts as a liveness failure
pub const MAX_MISSED_ACKS: u32 = 1;

/// What the controller must do on a heartbeat tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a heartbeat carrying the last sequence
    Send,
    /// Previous heartbeat was never acknowledged; the connection is dead
    LivenessFailure,
}

/// Per-connection heartbeat state
#[derive(Debug, Clone)]
pub struct HeartbeatState {
    interval: Duration,
    missed_acks: u32,
    last_sent_at: Option<Instant>,
    last_ack_at: Option<Instant>,
    latency: Option<Duration>,
}

impl HeartbeatState {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            missed_acks: 0,
            last_sent_at: None,
            last_ack_at: None,
            latency: None,
        }
    }

    /// Handle a timer tick
    pub fn on_tick(&mut self) -> HeartbeatAction {
        if self.missed_acks >= MAX_MISSED_ACKS {
            return HeartbeatAction::LivenessFailure;
        }
        self.missed_acks += 1;
        self.last_sent_at = Some(Instant::now());
        HeartbeatAction::Send
    }

    /// Handle a heartbeat ACK, returning the measured round trip if one was pending
    pub fn on_ack(&mut self) -> Option<Duration> {
        let now = Instant::now();
        self.missed_acks = 0;
        self.last_ack_at = Some(now);
        self.latency = self.last_sent_at.map(|sent| now.saturating_duration_since(sent));
        self.latency
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub const fn missed_acks(&self) -> u32 {
        self.missed_acks
    }

    #[must_use]
    pub const fn latency(&self) -> Option<Duration> {
        self.latency
    }

    #[must_use]
    pub const fn last_ack_at(&self) -> Option<Instant> {
        self.last_ack_at
    }
}

/// Repeating heartbeat timer
///
/// Ticks are produced by a spawned task and delivered through a channel. The
/// task is aborted when the timer is dropped, so a timer can never outlive the
/// connection that started it.
#[derive(Debug)]
pub struct HeartbeatTimer {
    ticks: mpsc::Receiver<()>,
    task: JoinHandle<()>,
}

impl HeartbeatTimer {
    /// Start ticking after `first_delay`, then every `interval`
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(interval: Duration, first_delay: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (tx, ticks) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + first_delay, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });

        Self { ticks, task }
    }

    /// Wait for the next tick
    ///
    /// Returns `None` only if the ticking task died.
    pub async fn tick(&mut self) -> Option<()> {
        self.ticks.recv().await
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
