//! Round trip time estimation from `PING`/`PONG` exchanges.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Number of samples kept for the moving average.
pub const RTT_SAMPLE_WINDOW: usize = 10;
/// Samples above this bound are discarded as bogus.
pub const MAX_RTT: Duration = Duration::from_secs(10);

/// Moving average of the last [`RTT_SAMPLE_WINDOW`] round trip samples of one socket.
#[derive(Debug, Default)]
pub struct RttTracker {
    samples: Mutex<VecDeque<Duration>>,
}

impl RttTracker {
    /// Create a tracker with no samples (smoothed RTT of zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample, evicting the oldest one once the window is full.
    pub fn record(&self, rtt: Duration) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        if samples.len() == RTT_SAMPLE_WINDOW {
            samples.pop_front();
        }
        samples.push_back(rtt);
    }

    /// Derive a sample from a `PONG` echoing `server_time`, received at `now`.
    ///
    /// Negative or implausibly large round trips are ignored and yield `None`.
    pub fn record_pong(&self, server_time_ms: i64, now_ms: i64) -> Option<Duration> {
        let elapsed = now_ms.checked_sub(server_time_ms)?;
        let rtt = Duration::from_millis(u64::try_from(elapsed).ok()?);
        if rtt > MAX_RTT {
            return None;
        }
        self.record(rtt);
        Some(rtt)
    }

    /// Mean of the retained samples.
    pub fn smoothed(&self) -> Duration {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        if samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = samples.iter().sum();
        total / u32::try_from(samples.len()).unwrap_or(u32::MAX)
    }

    /// Number of retained samples.
    pub fn sample_count(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Wall clock in unix milliseconds, as exchanged with clients.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
