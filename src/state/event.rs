use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Kind of fact recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// The control loop started.
    GameStarted,
    /// The final scoreboard was reached.
    GameFinished,
    /// The session was terminated early.
    GameCancelled,
    /// A round intro began.
    RoundStarted,
    /// A round board was exhausted.
    RoundFinished,
    /// A question was picked from the board.
    QuestionSelected,
    /// A buzzer race was won.
    ButtonPressed,
    /// An answer was submitted.
    AnswerSubmitted,
    /// An answer was scored correct.
    AnswerCorrect,
    /// An answer was scored wrong.
    AnswerIncorrect,
    /// The host issued a verdict.
    AnswerJudged,
    /// A secret question changed hands.
    SecretTransferred,
    /// A stake bet was placed.
    StakePlaced,
    /// A simultaneous question was scored.
    ForAllCompleted,
    /// A player's first socket connected.
    PlayerConnected,
    /// A player's last socket disconnected.
    PlayerDisconnected,
}

/// Append-only fact emitted at phase boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Event identifier.
    pub id: Uuid,
    /// Session the event belongs to.
    pub game_id: Uuid,
    /// Kind of fact.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Player involved, if any.
    pub user_id: Option<Uuid>,
    /// Round number, if relevant.
    pub round: Option<usize>,
    /// Question identifier, if relevant.
    pub question_id: Option<String>,
    /// Free-form details.
    pub data: Map<String, Value>,
    /// Emission time.
    pub timestamp: SystemTime,
}

impl GameEvent {
    /// Create an event with no references attached.
    pub fn new(game_id: Uuid, event_type: EventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            event_type,
            user_id: None,
            round: None,
            question_id: None,
            data: Map::new(),
            timestamp: SystemTime::now(),
        }
    }

    /// Attach the player involved.
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attach the round number.
    pub fn with_round(mut self, round: usize) -> Self {
        self.round = Some(round);
        self
    }

    /// Attach the question identifier.
    pub fn with_question(mut self, question_id: impl Into<String>) -> Self {
        self.question_id = Some(question_id.into());
        self
    }

    /// Attach one detail entry.
    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_owned(), value.into());
        self
    }
}
