// src/pipeline/timer.rs

//! Cycle scheduling.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Shutdown signal shared by the scheduler and the CLI. `true` means stop.
pub type Shutdown = watch::Receiver<bool>;

/// Create a shutdown sender and its receiver, initially running.
pub fn shutdown_channel() -> (watch::Sender<bool>, Shutdown) {
    watch::channel(false)
}

/// Resolves once shutdown is requested or every sender is gone.
pub async fn shutdown_requested(shutdown: &mut Shutdown) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Tracks when the next cycle is due.
///
/// The interval counts from the end of the previous cycle, so a slow cycle
/// delays the next one instead of overlapping it.
#[derive(Debug, Clone)]
pub struct CycleTimer {
    interval: Duration,
    tick: Duration,
    last: Option<Instant>,
}

impl CycleTimer {
    pub fn new(interval: Duration, tick: Duration) -> Self {
        Self {
            interval,
            tick: tick.max(Duration::from_millis(1)),
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True before the first cycle and once the interval has passed.
    pub fn elapsed(&self) -> bool {
        self.last
            .is_none_or(|last| last.elapsed() > self.interval)
    }

    /// Mark a cycle as finished now.
    pub fn reset(&mut self) {
        self.last = Some(Instant::now());
    }

    /// Sleep in ticks until the next cycle is due.
    ///
    /// Returns `false` if shutdown was requested first.
    pub async fn wait(&self, shutdown: &mut Shutdown) -> bool {
        while !self.elapsed() {
            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {}
                _ = shutdown_requested(shutdown) => return false,
            }
        }
        !*shutdown.borrow()
    }
}
