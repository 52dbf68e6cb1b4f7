use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{
    game::{CurrentQuestion, Player, PlayerScore, Role, Session, Settings},
    pack::Round,
    state_machine::GameStatus,
};

/// Participant as stored alongside its session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Account identifier.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Optional avatar location.
    pub avatar_url: Option<String>,
    /// Host or player.
    pub role: Role,
    /// Score at the time of the save.
    pub score: i32,
    /// Whether the player still takes part.
    pub is_active: bool,
    /// Whether the player reported being ready.
    pub is_ready: bool,
    /// Whether a socket was connected at the time of the save.
    pub is_connected: bool,
    /// Join time.
    pub joined_at: SystemTime,
    /// Leave time.
    pub left_at: Option<SystemTime>,
}

/// Persisted form of a session. Outlives the in-memory manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Session identifier.
    pub id: Uuid,
    /// Lobby room identifier.
    pub room_id: Uuid,
    /// Pack identifier.
    pub pack_id: Uuid,
    /// Phase at the time of the save.
    pub status: GameStatus,
    /// 1-based round number, 0 before the first round.
    pub current_round: usize,
    /// Participants in join order.
    pub players: Vec<PlayerEntity>,
    /// Board with per-question `used` flags.
    pub rounds: Vec<Round>,
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
    /// Start time.
    pub started_at: Option<SystemTime>,
    /// Scoreboard time.
    pub finished_at: Option<SystemTime>,
    /// Last mutation time.
    pub updated_at: SystemTime,
}

impl GameEntity {
    /// Whether the session is still being played.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Whether `user_id` takes part in the session.
    pub fn has_player(&self, user_id: Uuid) -> bool {
        self.players.iter().any(|player| player.user_id == user_id)
    }
}

impl From<&Player> for PlayerEntity {
    fn from(value: &Player) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username.clone(),
            avatar_url: value.avatar_url.clone(),
            role: value.role,
            score: value.score,
            is_active: value.is_active,
            is_ready: value.is_ready,
            is_connected: value.is_connected,
            joined_at: value.joined_at,
            left_at: value.left_at,
        }
    }
}

impl From<PlayerEntity> for Player {
    fn from(value: PlayerEntity) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username,
            avatar_url: value.avatar_url,
            role: value.role,
            score: value.score,
            is_active: value.is_active,
            is_ready: value.is_ready,
            is_connected: value.is_connected,
            joined_at: value.joined_at,
            left_at: value.left_at,
        }
    }
}

impl From<&Session> for GameEntity {
    fn from(value: &Session) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            pack_id: value.pack_id,
            status: value.status,
            current_round: value.current_round,
            players: value.players.values().map(PlayerEntity::from).collect(),
            rounds: value.rounds.clone(),
            active_player: value.active_player,
            current_question: value.current_question,
            settings: value.settings,
            winners: value.winners.clone(),
            final_scores: value.final_scores.clone(),
            created_at: value.created_at,
            started_at: value.started_at,
            finished_at: value.finished_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<GameEntity> for Session {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            pack_id: value.pack_id,
            status: value.status,
            players: value
                .players
                .into_iter()
                .map(|player| (player.user_id, Player::from(player)))
                .collect(),
            rounds: value.rounds,
            current_round: value.current_round,
            active_player: value.active_player,
            current_question: value.current_question,
            settings: value.settings,
            winners: value.winners,
            final_scores: value.final_scores,
            created_at: value.created_at,
            started_at: value.started_at,
            finished_at: value.finished_at,
            updated_at: value.updated_at,
        }
    }
}
