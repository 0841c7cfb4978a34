//! Identify gate
//!
//! The server only accepts one Identify per `identify_interval` across all of
//! an application's shards. Every controller takes a turn from the same gate
//! before identifying; resumes bypass it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{self, Instant};

/// Shared minimum spacing between identify commands
///
/// Turns are handed out in request order.
#[derive(Debug, Clone)]
pub struct IdentifyGate {
    interval: Duration,
    last_identify: Arc<Mutex<Option<Instant>>>,
}

impl IdentifyGate {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_identify: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for an identify turn
    ///
    /// The returned future does not borrow the gate, so a controller can park
    /// it inside its event loop. Dropping it before completion gives up the
    /// place in line.
    pub fn acquire(&self) -> impl Future<Output = IdentifyPermit> + Send + 'static {
        let last_identify = Arc::clone(&self.last_identify);
        let interval = self.interval;

        async move {
            let guard = last_identify.lock_owned().await;
            if let Some(last) = *guard {
                time::sleep_until(last + interval).await;
            }
            IdentifyPermit { guard }
        }
    }
}

/// An identify turn
///
/// Drop it once the Identify has been written: the drop time is what the next
/// turn is spaced from.
#[derive(Debug)]
pub struct IdentifyPermit {
    guard: OwnedMutexGuard<Option<Instant>>,
}

impl Drop for IdentifyPermit {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_turn_is_immediate() {
        let gate = IdentifyGate::new(Duration::from_secs(5));
        let start = Instant::now();

        drop(gate.acquire().await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turns_are_spaced_by_interval() {
        let gate = IdentifyGate::new(Duration::from_secs(5));
        let start = Instant::now();

        let mut turns = Vec::new();
        for _ in 0..3 {
            drop(gate.acquire().await);
            turns.push(start.elapsed());
        }

        assert_eq!(
            turns,
            vec![Duration::ZERO, Duration::from_secs(5), Duration::from_secs(10)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_counts_from_permit_release() {
        let gate = IdentifyGate::new(Duration::from_secs(5));
        let start = Instant::now();

        let permit = gate.acquire().await;
        time::advance(Duration::from_secs(2)).await;
        drop(permit);

        drop(gate.acquire().await);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_are_serialized() {
        let gate = IdentifyGate::new(Duration::from_secs(1));
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(move |_| {
                let turn = gate.acquire();
                tokio::spawn(async move {
                    drop(turn.await);
                    start.elapsed()
                })
            })
            .collect();

        let mut elapsed = Vec::new();
        for task in tasks {
            elapsed.push(task.await.unwrap());
        }
        elapsed.sort();

        assert_eq!(
            elapsed,
            vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(2)]
        );
    }
}
