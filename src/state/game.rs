use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    pack::{Question, Round},
    state_machine::GameStatus,
};

/// Default answer window, in seconds.
pub const DEFAULT_TIME_FOR_ANSWER: u64 = 30;
/// Default question selection window, in seconds.
pub const DEFAULT_TIME_FOR_CHOICE: u64 = 20;
/// Lower bound accepted for any per-action time limit, in seconds.
pub const MIN_ACTION_TIME: u64 = 1;
/// Upper bound accepted for any per-action time limit, in seconds.
pub const MAX_ACTION_TIME: u64 = 300;

/// Role of a participant. The host moderates and never scores or buzzes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Moderator picking questions and judging answers.
    Host,
    /// Competing participant.
    Player,
}

/// Participant tracked during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Account identifier.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Optional avatar location.
    pub avatar_url: Option<String>,
    /// Host or player.
    pub role: Role,
    /// Current score, never negative.
    pub score: i32,
    /// Whether the player still takes part in the game.
    pub is_active: bool,
    /// Whether the player reported being ready.
    pub is_ready: bool,
    /// Whether at least one socket of the player is connected.
    pub is_connected: bool,
    /// Time the player was added to the session.
    pub joined_at: SystemTime,
    /// Time the player left, if they did.
    pub left_at: Option<SystemTime>,
}

impl Player {
    /// Create an active, disconnected participant with a zero score.
    pub fn new(user_id: Uuid, username: String, avatar_url: Option<String>, role: Role) -> Self {
        Self {
            user_id,
            username,
            avatar_url,
            role,
            score: 0,
            is_active: true,
            is_ready: false,
            is_connected: false,
            joined_at: SystemTime::now(),
            left_at: None,
        }
    }

    /// Whether this participant moderates the session.
    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    /// Whether this participant may take part in buzzer races and answer questions.
    pub fn can_press_button(&self) -> bool {
        self.is_active && !self.is_host()
    }

    /// Add points, keeping the score non-negative.
    pub fn add_score(&mut self, points: i32) {
        self.score = self.score.saturating_add(points).max(0);
    }

    /// Remove points, flooring the score at zero.
    pub fn subtract_score(&mut self, points: i32) {
        self.score = self.score.saturating_sub(points).max(0);
    }

    /// Apply a signed score delta.
    pub fn apply_delta(&mut self, delta: i32) {
        if delta >= 0 {
            self.add_score(delta);
        } else {
            self.subtract_score(delta.saturating_neg());
        }
    }

    /// Mark the player as having left the session.
    pub fn leave(&mut self) {
        self.is_active = false;
        self.is_connected = false;
        self.left_at = Some(SystemTime::now());
    }
}

/// Per-session time limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Settings {
    /// Seconds allowed for buzzing, answering and simultaneous answers.
    pub time_for_answer: u64,
    /// Seconds allowed for the host to pick a question.
    pub time_for_choice: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            time_for_answer: DEFAULT_TIME_FOR_ANSWER,
            time_for_choice: DEFAULT_TIME_FOR_CHOICE,
        }
    }
}

impl Settings {
    /// Whether both limits fall inside the accepted range.
    pub fn is_valid(&self) -> bool {
        let range = MIN_ACTION_TIME..=MAX_ACTION_TIME;
        range.contains(&self.time_for_answer) && range.contains(&self.time_for_choice)
    }
}

/// Wager state of the active stake question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeInfo {
    /// Player placing the bet.
    pub user_id: Uuid,
    /// Smallest accepted bet, the question price.
    pub min_bet: i32,
    /// Largest accepted bet, `max(price, bettor score)`.
    pub max_bet: i32,
    /// Bet placed so far.
    pub current_bet: i32,
    /// Whether the bettor went all in.
    pub is_all_in: bool,
}

impl StakeInfo {
    /// Open the betting window for a question of `price` and a bettor holding `score` points.
    pub fn new(user_id: Uuid, price: i32, score: i32) -> Self {
        Self {
            user_id,
            min_bet: price,
            max_bet: price.max(score),
            current_bet: 0,
            is_all_in: false,
        }
    }

    /// Record a bet and return the accepted amount.
    ///
    /// Regular bets are clamped to `[min_bet, max_bet]`. An all-in bet takes the bettor's
    /// score, floored at `min_bet`.
    pub fn place(&mut self, amount: i32, all_in: bool, bettor_score: i32) -> i32 {
        let bet = if all_in {
            bettor_score.max(self.min_bet)
        } else {
            amount.clamp(self.min_bet, self.max_bet)
        };
        self.current_bet = bet;
        self.is_all_in = all_in;
        bet
    }
}

/// Ranked entry of the final scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerScore {
    /// Account identifier.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Final score.
    pub score: i32,
    /// Competition rank: tied scores share a rank, the next rank skips accordingly.
    pub rank: u32,
}

/// Position of the question currently in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentQuestion {
    /// Index of the theme inside the current round.
    pub theme_index: usize,
    /// Index of the question inside its theme.
    pub question_index: usize,
    /// Price in effect for this session; a stake bet overrides the pack price.
    pub price: i32,
}

/// Errors raised while assembling a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The same user was added twice.
    #[error("player `{0}` already joined the session")]
    PlayerExists(Uuid),
}

/// Authoritative state of one quiz session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier.
    pub id: Uuid,
    /// Lobby room the session was started from.
    pub room_id: Uuid,
    /// Pack the board content comes from.
    pub pack_id: Uuid,
    /// Current phase.
    pub status: GameStatus,
    /// Participants in join order.
    pub players: IndexMap<Uuid, Player>,
    /// Board content, with per-question `used` flags.
    pub rounds: Vec<Round>,
    /// 1-based number of the round in play, 0 before the first round.
    pub current_round: usize,
    /// Player expected to act next.
    pub active_player: Option<Uuid>,
    /// Question in play.
    pub current_question: Option<CurrentQuestion>,
    /// Time limits.
    pub settings: Settings,
    /// Top of the final scoreboard.
    pub winners: Vec<PlayerScore>,
    /// Full final scoreboard.
    pub final_scores: Vec<PlayerScore>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Time the first phase started.
    pub started_at: Option<SystemTime>,
    /// Time the scoreboard was reached.
    pub finished_at: Option<SystemTime>,
    /// Last mutation time.
    pub updated_at: SystemTime,
}

impl Session {
    /// Build a waiting session over the given board.
    pub fn new(room_id: Uuid, pack_id: Uuid, settings: Settings, rounds: Vec<Round>) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            room_id,
            pack_id,
            status: GameStatus::Waiting,
            players: IndexMap::new(),
            rounds,
            current_round: 0,
            active_player: None,
            current_question: None,
            settings,
            winners: Vec::new(),
            final_scores: Vec::new(),
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    /// Register a participant, rejecting duplicates.
    pub fn add_player(&mut self, player: Player) -> Result<(), SessionError> {
        if self.players.contains_key(&player.user_id) {
            return Err(SessionError::PlayerExists(player.user_id));
        }
        self.players.insert(player.user_id, player);
        Ok(())
    }

    /// The moderator of the session, if any.
    pub fn host(&self) -> Option<&Player> {
        self.players.values().find(|player| player.is_host())
    }

    /// Identifier of the moderator.
    pub fn host_id(&self) -> Option<Uuid> {
        self.host().map(|host| host.user_id)
    }

    /// Whether `user_id` is the moderator.
    pub fn is_host(&self, user_id: Uuid) -> bool {
        self.players
            .get(&user_id)
            .is_some_and(|player| player.is_host())
    }

    /// Non-host active players in join order.
    pub fn eligible_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|player| player.can_press_button())
    }

    /// Total number of rounds on the board.
    pub fn total_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Round in play.
    pub fn round(&self) -> Option<&Round> {
        self.current_round
            .checked_sub(1)
            .and_then(|index| self.rounds.get(index))
    }

    /// Mutable access to the round in play.
    pub fn round_mut(&mut self) -> Option<&mut Round> {
        self.current_round
            .checked_sub(1)
            .and_then(|index| self.rounds.get_mut(index))
    }

    /// Content of the question in play.
    pub fn question(&self) -> Option<&Question> {
        let current = self.current_question?;
        self.round()?
            .themes
            .get(current.theme_index)?
            .questions
            .get(current.question_index)
    }

    /// Stamp the last mutation time.
    pub fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }
}
