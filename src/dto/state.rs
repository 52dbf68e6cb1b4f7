//! Session snapshot broadcast to sockets as `STATE_UPDATE`.

use serde::Serialize;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    buzzer::PressEntry,
    for_all::ForAllResult,
    game::{Player, PlayerScore, Role, StakeInfo},
    media::MediaProgress,
    pack::{Question, Round, Theme},
    state_machine::GameStatus,
};

/// Point-in-time view of a session, redacted for its audience.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameStateSnapshot {
    /// Session identifier.
    pub game_id: Uuid,
    /// Current phase.
    pub status: GameStatus,
    /// 1-based round number, 0 before the first round.
    pub current_round: usize,
    /// Name of the round in play.
    pub round_name: Option<String>,
    /// Board of the round in play.
    pub themes: Vec<ThemeView>,
    /// Participants in join order.
    pub players: Vec<PlayerView>,
    /// Player expected to act next.
    pub active_player: Option<Uuid>,
    /// Question in play.
    pub current_question: Option<QuestionView>,
    /// Whole seconds left on the phase timer.
    pub time_remaining: u64,
    /// Every round of the pack, during the overview only.
    pub all_rounds: Option<Vec<RoundOverview>>,
    /// Top of the scoreboard, at game end only.
    pub winners: Option<Vec<PlayerScore>>,
    /// Full scoreboard, at game end only.
    pub final_scores: Option<Vec<PlayerScore>>,
    /// Wager bounds, during stake betting only.
    pub stake_info: Option<StakeView>,
    /// Receiver of the secret question.
    pub secret_target: Option<Uuid>,
    /// Results of the simultaneous question, during its results phase only.
    pub for_all_results: Option<Vec<ForAllResultView>>,
    /// Players that already answered the simultaneous question.
    pub for_all_answered: Option<Vec<Uuid>>,
    /// Round preload progress, during the round intro only.
    pub media_progress: Option<MediaProgress>,
}

/// Public projection of a participant.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerView {
    /// Account identifier.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Avatar location.
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

impl From<&Player> for PlayerView {
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
        }
    }
}

/// Board column.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ThemeView {
    /// Theme identifier.
    pub id: String,
    /// Theme name.
    pub name: String,
    /// Question cells.
    pub questions: Vec<QuestionView>,
}

impl ThemeView {
    /// Project a theme, revealing question text only when asked to.
    pub fn new(theme: &Theme, include_text: bool) -> Self {
        Self {
            id: theme.id.clone(),
            name: theme.name.clone(),
            questions: theme
                .questions
                .iter()
                .map(|question| QuestionView::new(question, include_text))
                .collect(),
        }
    }
}

/// Question cell or question in play.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionView {
    /// Question identifier.
    pub id: String,
    /// Price in effect.
    pub price: i32,
    /// Whether the question can still be selected.
    pub available: bool,
    /// Question type wire name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Question text, when revealed.
    pub text: Option<String>,
    /// Media kind, when revealed.
    pub media_type: Option<String>,
    /// Media location, when revealed.
    pub media_url: Option<String>,
    /// Media duration, when revealed.
    pub media_duration_ms: Option<u64>,
    /// Reference answer, for audiences allowed to see it.
    pub answer: Option<String>,
}

impl QuestionView {
    /// Project a question, revealing its content only when asked to.
    pub fn new(question: &Question, include_text: bool) -> Self {
        let revealed = |value: &str| (include_text && !value.is_empty()).then(|| value.to_owned());
        Self {
            id: question.id.clone(),
            price: question.price,
            available: question.is_available(),
            kind: question.kind.as_str().to_owned(),
            text: include_text.then(|| question.text.clone()),
            media_type: revealed(&question.media_type),
            media_url: revealed(&question.media_url),
            media_duration_ms: (include_text && question.media_duration_ms > 0)
                .then_some(question.media_duration_ms),
            answer: None,
        }
    }

    /// Override the displayed price.
    pub fn with_price(mut self, price: i32) -> Self {
        self.price = price;
        self
    }

    /// Attach the reference answer.
    pub fn with_answer(mut self, answer: &str) -> Self {
        self.answer = Some(answer.to_owned());
        self
    }
}

/// Summary of a round shown during the overview.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundOverview {
    /// 1-based round number.
    pub round_number: u32,
    /// Round name.
    pub name: String,
    /// Names of the round themes.
    pub theme_names: Vec<String>,
}

impl From<&Round> for RoundOverview {
    fn from(value: &Round) -> Self {
        Self {
            round_number: value.round_number,
            name: value.name.clone(),
            theme_names: value.themes.iter().map(|theme| theme.name.clone()).collect(),
        }
    }
}

/// Wager bounds of the stake question in play.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct StakeView {
    /// Bettor.
    pub user_id: Uuid,
    /// Smallest accepted bet.
    pub min_bet: i32,
    /// Largest accepted bet.
    pub max_bet: i32,
    /// Bet placed so far.
    pub current_bet: i32,
    /// Whether the bettor went all in.
    pub is_all_in: bool,
}

impl From<&StakeInfo> for StakeView {
    fn from(value: &StakeInfo) -> Self {
        Self {
            user_id: value.user_id,
            min_bet: value.min_bet,
            max_bet: value.max_bet,
            current_bet: value.current_bet,
            is_all_in: value.is_all_in,
        }
    }
}

/// One buzz in a race outcome.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PressView {
    /// Presser.
    pub user_id: Uuid,
    /// Presser display name.
    pub username: String,
    /// Estimated reaction time in milliseconds.
    pub reaction_time_ms: u64,
    /// Round trip time used for compensation, in milliseconds.
    pub rtt_ms: u64,
}

impl From<&PressEntry> for PressView {
    fn from(value: &PressEntry) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username.clone(),
            reaction_time_ms: duration_millis(value.reaction_time),
            rtt_ms: duration_millis(value.rtt),
        }
    }
}

/// One scored answer of a simultaneous question.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ForAllResultView {
    /// Author.
    pub user_id: Uuid,
    /// Author display name.
    pub username: String,
    /// Submitted answer.
    pub answer: String,
    /// Verdict.
    pub is_correct: bool,
    /// Points added (positive) or removed (negative).
    pub score_delta: i32,
}

impl From<&ForAllResult> for ForAllResultView {
    fn from(value: &ForAllResult) -> Self {
        Self {
            user_id: value.user_id,
            username: value.username.clone(),
            answer: value.answer.clone(),
            is_correct: value.is_correct,
            score_delta: value.score_delta,
        }
    }
}

/// Milliseconds of a duration, saturating.
pub fn duration_millis(value: std::time::Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}
