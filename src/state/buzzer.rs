//! Latency-compensated buzzer race.
//!
//! Each press is stamped on arrival and shifted back by half the presser's round trip time,
//! so the race is decided by reaction time rather than by network distance.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// One recorded buzz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PressEntry {
    /// Presser.
    pub user_id: Uuid,
    /// Presser display name.
    pub username: String,
    /// Arrival time on the server.
    pub received_at: Instant,
    /// Smoothed round trip time of the presser at arrival.
    pub rtt: Duration,
    /// `received_at - rtt / 2`, the estimated moment the player pressed.
    pub adjusted_time: Instant,
    /// Time between the start of the race and `adjusted_time`.
    pub reaction_time: Duration,
}

/// Reason a buzz was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PressRejected {
    /// The race no longer accepts presses.
    #[error("button press window is closed")]
    Closed,
    /// The user already buzzed in this race.
    #[error("player already pressed the button")]
    AlreadyPressed,
}

/// Arbitrates one buzzer race at a time.
#[derive(Debug)]
pub struct ButtonPressArbitrator {
    question_at: Instant,
    presses: Vec<PressEntry>,
    closed: bool,
}

impl Default for ButtonPressArbitrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ButtonPressArbitrator {
    /// Create an open arbitrator whose race starts now.
    pub fn new() -> Self {
        Self {
            question_at: Instant::now(),
            presses: Vec::new(),
            closed: false,
        }
    }

    /// Forget previous presses and start a new race now.
    pub fn reset(&mut self) {
        self.question_at = Instant::now();
        self.presses.clear();
        self.closed = false;
    }

    /// Record a buzz arriving now.
    pub fn press(
        &mut self,
        user_id: Uuid,
        username: &str,
        rtt: Duration,
    ) -> Result<&PressEntry, PressRejected> {
        self.press_at(user_id, username, rtt, Instant::now())
    }

    /// Record a buzz that arrived at `received_at`.
    pub fn press_at(
        &mut self,
        user_id: Uuid,
        username: &str,
        rtt: Duration,
        received_at: Instant,
    ) -> Result<&PressEntry, PressRejected> {
        if self.closed {
            return Err(PressRejected::Closed);
        }
        if self.presses.iter().any(|entry| entry.user_id == user_id) {
            return Err(PressRejected::AlreadyPressed);
        }

        let adjusted_time = received_at.checked_sub(rtt / 2).unwrap_or(received_at);
        self.presses.push(PressEntry {
            user_id,
            username: username.to_owned(),
            received_at,
            rtt,
            adjusted_time,
            reaction_time: adjusted_time.saturating_duration_since(self.question_at),
        });
        Ok(&self.presses[self.presses.len() - 1])
    }

    /// Stop accepting presses.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether presses are still accepted.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Earliest presser by adjusted time; on equal times the first arrival wins.
    pub fn winner(&self) -> Option<&PressEntry> {
        self.presses.iter().min_by_key(|entry| entry.adjusted_time)
    }

    /// Every recorded press ordered by adjusted time.
    pub fn all_presses(&self) -> Vec<PressEntry> {
        let mut presses = self.presses.clone();
        presses.sort_by_key(|entry| entry.adjusted_time);
        presses
    }

    /// Whether anyone buzzed.
    pub fn has_presses(&self) -> bool {
        !self.presses.is_empty()
    }

    /// Number of recorded presses.
    pub fn press_count(&self) -> usize {
        self.presses.len()
    }
}
