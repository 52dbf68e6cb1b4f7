//! Restartable one-shot countdown driving phase deadlines.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};

/// Fire notification emitted when a countdown elapses.
///
/// Each notification carries the generation of the countdown that produced it so a fire
/// racing with a restart can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    generation: u64,
}

#[derive(Default)]
struct TimerInner {
    generation: u64,
    deadline: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

/// One-shot countdown with a size-1 fire channel.
///
/// Starting the timer cancels the previous countdown. Fires of cancelled countdowns are
/// discarded by [`PhaseTimer::accept`].
pub struct PhaseTimer {
    inner: Mutex<TimerInner>,
    fired_tx: mpsc::Sender<TimerFired>,
}

impl PhaseTimer {
    /// Create an idle timer and the receiving end of its fire channel.
    pub fn new() -> (Self, mpsc::Receiver<TimerFired>) {
        let (fired_tx, fired_rx) = mpsc::channel(1);
        let timer = Self {
            inner: Mutex::new(TimerInner::default()),
            fired_tx,
        };
        (timer, fired_rx)
    }

    /// Arm a new countdown, cancelling any running one.
    pub fn start(&self, duration: Duration) {
        let mut inner = self.lock();
        if let Some(task) = inner.task.take() {
            task.abort();
        }

        inner.generation = inner.generation.wrapping_add(1);
        let generation = inner.generation;
        let deadline = Instant::now() + duration;
        inner.deadline = Some(deadline);

        let fired_tx = self.fired_tx.clone();
        inner.task = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            // Waits behind a stale fire still sitting in the channel; aborted on restart.
            let _ = fired_tx.send(TimerFired { generation }).await;
        }));
    }

    /// Cancel the running countdown. Safe to call when idle.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.deadline = None;
        inner.generation = inner.generation.wrapping_add(1);
    }

    /// Whole seconds left on the countdown, 0 when idle or elapsed.
    pub fn remaining_secs(&self) -> u64 {
        let inner = self.lock();
        inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()).as_secs())
            .unwrap_or(0)
    }

    /// Whether a countdown is armed and has not been consumed.
    pub fn is_active(&self) -> bool {
        self.lock().deadline.is_some()
    }

    /// Consume a fire notification, returning `true` only for the current countdown.
    pub fn accept(&self, fired: TimerFired) -> bool {
        let mut inner = self.lock();
        if inner.deadline.is_none() || inner.generation != fired.generation {
            return false;
        }
        inner.deadline = None;
        inner.task = None;
        true
    }

    fn lock(&self) -> MutexGuard<'_, TimerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        if let Some(task) = self.lock().task.take() {
            task.abort();
        }
    }
}
