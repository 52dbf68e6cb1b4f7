use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{GameEntity, PlayerEntity},
    dto::{format_system_time, validation::validate_roster},
    state::{
        game::{MAX_ACTION_TIME, MIN_ACTION_TIME, PlayerScore, Role, Settings},
        state_machine::GameStatus,
    },
};

/// Payload used to start a new session from a lobby room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateGameRequest {
    /// Lobby room the players come from.
    pub room_id: Uuid,
    /// Question pack to play.
    pub pack_id: Uuid,
    /// Participants, exactly one of them hosting.
    #[validate(length(min = 2), nested, custom(function = "validate_roster"))]
    pub players: Vec<PlayerInput>,
    /// Time limits; server defaults apply when omitted.
    #[serde(default)]
    #[validate(nested)]
    pub settings: Option<SettingsInput>,
}

/// Incoming participant definition.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct PlayerInput {
    /// Account identifier.
    pub user_id: Uuid,
    /// Display name.
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    /// Avatar location.
    #[serde(default)]
    #[validate(url)]
    pub avatar_url: Option<String>,
    /// Host or player.
    pub role: Role,
}

/// Incoming time limits, in seconds.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema, Validate)]
pub struct SettingsInput {
    /// Seconds for buzzing and answering.
    #[validate(range(min = MIN_ACTION_TIME, max = MAX_ACTION_TIME))]
    pub time_for_answer: u64,
    /// Seconds for the host to pick a question.
    #[validate(range(min = MIN_ACTION_TIME, max = MAX_ACTION_TIME))]
    pub time_for_choice: u64,
}

impl From<SettingsInput> for Settings {
    fn from(value: SettingsInput) -> Self {
        Self {
            time_for_answer: value.time_for_answer,
            time_for_choice: value.time_for_choice,
        }
    }
}

/// Response returned once a session is created and started.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateGameResponse {
    /// Session identifier.
    pub game_id: Uuid,
    /// Relative URL of the session socket.
    pub websocket_url: String,
    /// Always `created`.
    pub status: String,
}

/// Query identifying the caller when no authentication layer is present.
#[derive(Debug, Deserialize, IntoParams)]
pub struct UserQuery {
    /// Account identifier of the caller.
    pub user_id: Uuid,
}

/// Public projection of a participant's persisted state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerSummary {
    /// Account identifier.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Avatar location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Host or player.
    pub role: Role,
    /// Current score.
    pub score: i32,
    /// Whether the player still takes part.
    pub is_active: bool,
    /// Whether the player reported being ready.
    pub is_ready: bool,
    /// Whether a socket of the player is connected.
    pub is_connected: bool,
}

impl From<PlayerEntity> for PlayerSummary {
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
        }
    }
}

/// Summary of a session returned by the REST endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameSummary {
    /// Session identifier.
    pub game_id: Uuid,
    /// Lobby room identifier.
    pub room_id: Uuid,
    /// Pack identifier.
    pub pack_id: Uuid,
    /// Current phase.
    pub status: GameStatus,
    /// 1-based round number, 0 before the first round.
    pub current_round: usize,
    /// Participants in join order.
    pub players: Vec<PlayerSummary>,
    /// Time limits.
    pub settings: Settings,
    /// Top of the scoreboard once the game ended.
    pub winners: Vec<PlayerScore>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 start time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// RFC 3339 end time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl From<GameEntity> for GameSummary {
    fn from(value: GameEntity) -> Self {
        Self {
            game_id: value.id,
            room_id: value.room_id,
            pack_id: value.pack_id,
            status: value.status,
            current_round: value.current_round,
            players: value.players.into_iter().map(PlayerSummary::from).collect(),
            settings: value.settings,
            winners: value.winners,
            created_at: format_system_time(value.created_at),
            started_at: value.started_at.map(format_system_time),
            finished_at: value.finished_at.map(format_system_time),
        }
    }
}

/// Answer of the active-game lookup.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveGameResponse {
    /// Whether the caller takes part in a running session.
    pub has_active_game: bool,
    /// The running session, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<GameSummary>,
}
