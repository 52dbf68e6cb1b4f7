//! Collector for questions every eligible player answers at the same time.

use std::time::SystemTime;

use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

/// Answer submitted by one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForAllAnswer {
    /// Author of the answer.
    pub user_id: Uuid,
    /// Author display name.
    pub username: String,
    /// Raw submitted text.
    pub answer: String,
    /// Submission time.
    pub submitted_at: SystemTime,
}

/// Scoring outcome for one collected answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForAllResult {
    /// Author of the answer.
    pub user_id: Uuid,
    /// Author display name.
    pub username: String,
    /// Raw submitted text.
    pub answer: String,
    /// Verdict of the comparator.
    pub is_correct: bool,
    /// `+price` when correct, `-price` otherwise.
    pub score_delta: i32,
}

/// Reason an answer was not collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ForAllRejected {
    /// Collection is not running.
    #[error("answers are no longer collected")]
    Closed,
    /// The player already answered this question.
    #[error("player already answered")]
    AlreadyAnswered,
}

/// Collects one answer per player until closed.
#[derive(Debug)]
pub struct ForAllCollector {
    correct_answer: String,
    price: i32,
    answers: IndexMap<Uuid, ForAllAnswer>,
    closed: bool,
}

impl Default for ForAllCollector {
    fn default() -> Self {
        Self {
            correct_answer: String::new(),
            price: 0,
            answers: IndexMap::new(),
            closed: true,
        }
    }
}

impl ForAllCollector {
    /// Create a closed collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open collection for a question worth `price` points.
    pub fn start(&mut self, correct_answer: &str, price: i32) {
        self.correct_answer = correct_answer.to_owned();
        self.price = price;
        self.answers.clear();
        self.closed = false;
    }

    /// Record an answer, returning the number of answers collected so far.
    pub fn submit(
        &mut self,
        user_id: Uuid,
        username: &str,
        answer: &str,
    ) -> Result<usize, ForAllRejected> {
        if self.closed {
            return Err(ForAllRejected::Closed);
        }
        if self.answers.contains_key(&user_id) {
            return Err(ForAllRejected::AlreadyAnswered);
        }
        self.answers.insert(
            user_id,
            ForAllAnswer {
                user_id,
                username: username.to_owned(),
                answer: answer.to_owned(),
                submitted_at: SystemTime::now(),
            },
        );
        Ok(self.answers.len())
    }

    /// Stop accepting answers.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether answers are no longer accepted.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether `user_id` already answered.
    pub fn has_answered(&self, user_id: Uuid) -> bool {
        self.answers.contains_key(&user_id)
    }

    /// Number of collected answers.
    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }

    /// Authors of the collected answers, in submission order.
    pub fn answered_users(&self) -> Vec<Uuid> {
        self.answers.keys().copied().collect()
    }

    /// Reference answer of the question being collected.
    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    /// Score one result per collected answer, in submission order.
    ///
    /// `is_correct` receives the submitted answer and the reference answer.
    pub fn results<F>(&self, is_correct: F) -> Vec<ForAllResult>
    where
        F: Fn(&str, &str) -> bool,
    {
        self.answers
            .values()
            .map(|entry| {
                let correct = is_correct(&entry.answer, &self.correct_answer);
                ForAllResult {
                    user_id: entry.user_id,
                    username: entry.username.clone(),
                    answer: entry.answer.clone(),
                    is_correct: correct,
                    score_delta: if correct { self.price } else { -self.price },
                }
            })
            .collect()
    }

    /// Drop all answers and close collection.
    pub fn reset(&mut self) {
        self.correct_answer.clear();
        self.price = 0;
        self.answers.clear();
        self.closed = true;
    }
}
