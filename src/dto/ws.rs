use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::state::{ForAllResultView, GameStateSnapshot, PressView},
    state::{
        game::PlayerScore,
        media::{MediaItem, MediaProgress},
    },
};

/// Failure to decode a client frame.
#[derive(Debug, Error)]
pub enum InboundError {
    /// The frame is not a `{type, payload}` JSON object.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The payload does not match the declared type.
    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        /// Declared message type.
        kind: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// The declared type is not part of the protocol.
    #[error("unknown message type `{0}`")]
    UnknownType(String),
}

#[derive(Debug, Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// Frame received from a session socket, decoded once at the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Answer to a server `PING`, consumed by the transport for RTT tracking.
    Pong(PongPayload),
    /// Gameplay action forwarded to the session manager.
    Action(ClientAction),
}

/// Gameplay actions a client can issue.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Host picks a question from the board.
    SelectQuestion(SelectQuestionPayload),
    /// Player buzzes in.
    PressButton,
    /// Buzzer winner answers.
    SubmitAnswer(AnswerPayload),
    /// Host issues a verdict.
    JudgeAnswer(JudgeAnswerPayload),
    /// Preload progress report.
    MediaLoadProgress(MediaLoadProgressPayload),
    /// Preload finished.
    MediaLoadComplete(MediaLoadCompletePayload),
    /// Host hands a secret question to a player.
    TransferSecret(TransferSecretPayload),
    /// Bettor places a stake.
    PlaceStake(PlaceStakePayload),
    /// Player answers a simultaneous question.
    SubmitForAllAnswer(AnswerPayload),
}

impl ClientAction {
    /// Wire name of the action.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientAction::SelectQuestion(_) => "SELECT_QUESTION",
            ClientAction::PressButton => "PRESS_BUTTON",
            ClientAction::SubmitAnswer(_) => "SUBMIT_ANSWER",
            ClientAction::JudgeAnswer(_) => "JUDGE_ANSWER",
            ClientAction::MediaLoadProgress(_) => "MEDIA_LOAD_PROGRESS",
            ClientAction::MediaLoadComplete(_) => "MEDIA_LOAD_COMPLETE",
            ClientAction::TransferSecret(_) => "TRANSFER_SECRET",
            ClientAction::PlaceStake(_) => "PLACE_STAKE",
            ClientAction::SubmitForAllAnswer(_) => "SUBMIT_FOR_ALL_ANSWER",
        }
    }
}

impl ClientMessage {
    /// Decode a text frame. Unknown types and mismatched payloads are errors.
    pub fn from_json_str(raw: &str) -> Result<Self, InboundError> {
        let RawClientMessage { kind, payload } =
            serde_json::from_str(raw).map_err(InboundError::Malformed)?;
        let payload = match payload {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let message = match kind.as_str() {
            "PONG" => ClientMessage::Pong(decode(&kind, payload)?),
            "PRESS_BUTTON" => ClientMessage::Action(ClientAction::PressButton),
            "SELECT_QUESTION" => {
                ClientMessage::Action(ClientAction::SelectQuestion(decode(&kind, payload)?))
            }
            "SUBMIT_ANSWER" => {
                ClientMessage::Action(ClientAction::SubmitAnswer(decode(&kind, payload)?))
            }
            "JUDGE_ANSWER" => {
                ClientMessage::Action(ClientAction::JudgeAnswer(decode(&kind, payload)?))
            }
            "MEDIA_LOAD_PROGRESS" => {
                ClientMessage::Action(ClientAction::MediaLoadProgress(decode(&kind, payload)?))
            }
            "MEDIA_LOAD_COMPLETE" => {
                ClientMessage::Action(ClientAction::MediaLoadComplete(decode(&kind, payload)?))
            }
            "TRANSFER_SECRET" => {
                ClientMessage::Action(ClientAction::TransferSecret(decode(&kind, payload)?))
            }
            "PLACE_STAKE" => {
                ClientMessage::Action(ClientAction::PlaceStake(decode(&kind, payload)?))
            }
            "SUBMIT_FOR_ALL_ANSWER" => {
                ClientMessage::Action(ClientAction::SubmitForAllAnswer(decode(&kind, payload)?))
            }
            _ => return Err(InboundError::UnknownType(kind)),
        };
        Ok(message)
    }
}

fn decode<T: DeserializeOwned>(kind: &str, payload: Value) -> Result<T, InboundError> {
    serde_json::from_value(payload).map_err(|source| InboundError::InvalidPayload {
        kind: kind.to_owned(),
        source,
    })
}

/// `PONG` payload echoing the server timestamp of the matching `PING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
pub struct PongPayload {
    /// Server time (unix milliseconds) copied from the `PING`.
    pub server_time: i64,
    /// Client clock when the `PING` was received.
    #[serde(default)]
    pub client_time: i64,
}

/// `SELECT_QUESTION` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct SelectQuestionPayload {
    /// Theme identifier or name.
    pub theme_id: String,
    /// Question identifier.
    pub question_id: String,
}

/// Payload of `SUBMIT_ANSWER` and `SUBMIT_FOR_ALL_ANSWER`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct AnswerPayload {
    /// Free-text answer.
    pub answer: String,
}

/// `JUDGE_ANSWER` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
pub struct JudgeAnswerPayload {
    /// Player being judged.
    pub user_id: Uuid,
    /// Host verdict.
    pub correct: bool,
}

/// `MEDIA_LOAD_PROGRESS` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
pub struct MediaLoadProgressPayload {
    /// Assets loaded so far.
    pub loaded: u32,
    /// Assets to load.
    pub total: u32,
    /// Bytes loaded so far.
    #[serde(default)]
    pub bytes_loaded: u64,
    /// Completion percentage.
    pub percent: u8,
}

/// `MEDIA_LOAD_COMPLETE` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
pub struct MediaLoadCompletePayload {
    /// Round the client preloaded.
    #[serde(default)]
    pub round: Option<usize>,
    /// Assets loaded.
    pub loaded_count: u32,
}

/// `TRANSFER_SECRET` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
pub struct TransferSecretPayload {
    /// Player receiving the question.
    pub target_user_id: Uuid,
}

/// `PLACE_STAKE` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
pub struct PlaceStakePayload {
    /// Requested bet, clamped by the server.
    pub amount: i32,
    /// Bet the whole score.
    #[serde(default)]
    pub all_in: bool,
}

/// Messages pushed to session sockets.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Full session snapshot.
    StateUpdate(Box<GameStateSnapshot>),
    /// Outcome of a buzzer race.
    ButtonPressed(ButtonPressedPayload),
    /// Automatic verdict of a submitted answer.
    AnswerResult(AnswerResultPayload),
    /// Error reported to one client.
    Error(ErrorPayload),
    /// Latency probe.
    Ping(PingPayload),
    /// Assets to preload for the round.
    RoundMediaManifest(RoundMediaManifestPayload),
    /// Synchronized media playback start.
    StartMedia(StartMediaPayload),
    /// A secret question changed hands.
    SecretTransferred(SecretTransferredPayload),
    /// A stake bet was accepted.
    StakePlaced(StakePlacedPayload),
    /// Results of a simultaneous question.
    ForAllResults(ForAllResultsPayload),
    /// A round board was exhausted.
    RoundComplete(RoundCompletePayload),
    /// Final scoreboard.
    GameComplete(GameCompletePayload),
}

impl ServerMessage {
    /// Error message for a session that is not running.
    pub fn game_not_found() -> Self {
        ServerMessage::Error(ErrorPayload {
            code: "GAME_NOT_FOUND".into(),
            message: "Game not found or not started".into(),
        })
    }

    /// Wire name of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::StateUpdate(_) => "STATE_UPDATE",
            ServerMessage::ButtonPressed(_) => "BUTTON_PRESSED",
            ServerMessage::AnswerResult(_) => "ANSWER_RESULT",
            ServerMessage::Error(_) => "ERROR",
            ServerMessage::Ping(_) => "PING",
            ServerMessage::RoundMediaManifest(_) => "ROUND_MEDIA_MANIFEST",
            ServerMessage::StartMedia(_) => "START_MEDIA",
            ServerMessage::SecretTransferred(_) => "SECRET_TRANSFERRED",
            ServerMessage::StakePlaced(_) => "STAKE_PLACED",
            ServerMessage::ForAllResults(_) => "FOR_ALL_RESULTS",
            ServerMessage::RoundComplete(_) => "ROUND_COMPLETE",
            ServerMessage::GameComplete(_) => "GAME_COMPLETE",
        }
    }
}

/// `BUTTON_PRESSED` payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ButtonPressedPayload {
    /// Race winner.
    pub winner_id: Uuid,
    /// Winner display name.
    pub winner_name: String,
    /// Winner reaction time in milliseconds.
    pub reaction_time_ms: u64,
    /// Every press ordered by adjusted time.
    pub presses: Vec<PressView>,
}

/// `ANSWER_RESULT` payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerResultPayload {
    /// Answering player.
    pub user_id: Uuid,
    /// Answering player display name.
    pub username: String,
    /// Submitted answer, absent for verbal answers judged by the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Verdict.
    pub correct: bool,
    /// Reference answer, revealed with the verdict.
    pub correct_answer: String,
    /// Points added (positive) or removed (negative).
    pub score_delta: i32,
    /// Score after the update.
    pub new_score: i32,
}

/// `ERROR` payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorPayload {
    /// Machine readable code.
    pub code: String,
    /// Human readable description.
    pub message: String,
}

/// `PING` payload.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct PingPayload {
    /// Server clock in unix milliseconds, echoed back in `PONG`.
    pub server_time: i64,
}

/// `ROUND_MEDIA_MANIFEST` payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundMediaManifestPayload {
    /// Round number.
    pub round: usize,
    /// Assets to preload.
    pub media: Vec<MediaItem>,
    /// Estimated total size in bytes.
    pub total_size: u64,
    /// Number of assets.
    pub total_count: usize,
}

/// `START_MEDIA` payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StartMediaPayload {
    /// Manifest identifier of the asset.
    pub media_id: String,
    /// Media kind.
    pub media_type: String,
    /// Asset location.
    pub url: String,
    /// Unix milliseconds at which every client starts playback.
    pub start_at: i64,
    /// Playback duration in milliseconds.
    pub duration_ms: u64,
}

/// `SECRET_TRANSFERRED` payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SecretTransferredPayload {
    /// Host that handed the question over, absent for automatic transfers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<Uuid>,
    /// Player receiving the question.
    pub to_user_id: Uuid,
    /// Receiver display name.
    pub to_username: String,
}

/// `STAKE_PLACED` payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StakePlacedPayload {
    /// Bettor.
    pub user_id: Uuid,
    /// Accepted bet.
    pub amount: i32,
    /// Whether the bettor went all in.
    pub all_in: bool,
}

/// `FOR_ALL_RESULTS` payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ForAllResultsPayload {
    /// Reference answer.
    pub correct_answer: String,
    /// One entry per collected answer.
    pub results: Vec<ForAllResultView>,
}

/// `ROUND_COMPLETE` payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundCompletePayload {
    /// Finished round.
    pub round: usize,
    /// Preload progress of the finished round.
    pub media_progress: MediaProgress,
}

/// `GAME_COMPLETE` payload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameCompletePayload {
    /// Top of the scoreboard.
    pub winners: Vec<PlayerScore>,
    /// Full scoreboard.
    pub final_scores: Vec<PlayerScore>,
}
