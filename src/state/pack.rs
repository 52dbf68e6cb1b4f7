//! Question pack content tree: rounds, themes and questions.
//!
//! Content is loaded once per session. The only field mutated during play is
//! [`Question::used`], flipped exactly once when the question is selected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Media kind that carries no preloadable asset.
const TEXT_MEDIA_TYPE: &str = "text";

/// Gameplay branch taken when a question is selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    /// Buzzer race between all eligible players.
    #[default]
    #[serde(rename = "normal", alias = "")]
    Normal,
    /// The host hands the question to a chosen player.
    #[serde(rename = "secret")]
    Secret,
    /// The lowest-scoring player wagers before the question is revealed.
    #[serde(rename = "stake")]
    Stake,
    /// Every eligible player answers simultaneously.
    #[serde(rename = "forAll")]
    ForAll,
}

impl QuestionType {
    /// Wire name of the question type.
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Normal => "normal",
            QuestionType::Secret => "secret",
            QuestionType::Stake => "stake",
            QuestionType::ForAll => "forAll",
        }
    }
}

/// A single priced question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Identifier unique within its theme.
    pub id: String,
    /// Points awarded (or deducted) for this question.
    pub price: i32,
    /// Question text shown to players.
    pub text: String,
    /// Reference answer used for automatic validation.
    pub answer: String,
    /// Branch taken on selection.
    #[serde(default, rename = "type")]
    pub kind: QuestionType,
    /// Media kind (`image`, `audio`, `video`, `text` or empty).
    #[serde(default)]
    pub media_type: String,
    /// Location of the media asset.
    #[serde(default)]
    pub media_url: String,
    /// Playback duration of the media, zero when unknown.
    #[serde(default)]
    pub media_duration_ms: u64,
    /// Set once the question has been selected.
    #[serde(default)]
    pub used: bool,
}

impl Question {
    /// Compare a submitted answer against the reference, ignoring case and surrounding spaces.
    pub fn validate_answer(&self, submitted: &str) -> bool {
        normalize_answer(submitted) == normalize_answer(&self.answer)
    }

    /// Whether the question carries a preloadable media asset.
    pub fn has_media(&self) -> bool {
        !self.media_type.is_empty()
            && self.media_type != TEXT_MEDIA_TYPE
            && !self.media_url.is_empty()
    }

    /// Whether the question can still be selected.
    pub fn is_available(&self) -> bool {
        !self.used
    }

    /// Flag the question as selected. Returns `false` if it was already used.
    pub fn mark_used(&mut self) -> bool {
        if self.used {
            return false;
        }
        self.used = true;
        true
    }
}

/// Normalisation applied to both sides of an answer comparison.
pub fn normalize_answer(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Named group of questions inside a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    /// Identifier unique within its round.
    pub id: String,
    /// Display name, also accepted as a lookup key.
    pub name: String,
    /// Questions ordered by ascending price.
    pub questions: Vec<Question>,
}

impl Theme {
    /// Locate a question by identifier.
    pub fn find_question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Whether at least one question has not been played yet.
    pub fn has_available_questions(&self) -> bool {
        self.questions.iter().any(Question::is_available)
    }
}

/// One round of the game board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Identifier of the round.
    pub id: String,
    /// 1-based position in the pack.
    pub round_number: u32,
    /// Display name.
    pub name: String,
    /// Themes making up the board.
    pub themes: Vec<Theme>,
}

impl Round {
    /// True once every question of every theme has been used.
    pub fn is_complete(&self) -> bool {
        self.themes
            .iter()
            .flat_map(|theme| theme.questions.iter())
            .all(|question| question.used)
    }

    /// Index of the theme whose id or name matches.
    pub fn find_theme(&self, id_or_name: &str) -> Option<usize> {
        self.themes
            .iter()
            .position(|theme| theme.id == id_or_name || theme.name == id_or_name)
    }

    /// Position `(theme, question)` of the first question that has not been played.
    pub fn first_available(&self) -> Option<(usize, usize)> {
        self.themes.iter().enumerate().find_map(|(theme_idx, theme)| {
            theme
                .questions
                .iter()
                .position(Question::is_available)
                .map(|question_idx| (theme_idx, question_idx))
        })
    }

    /// Number of questions across all themes.
    pub fn total_questions(&self) -> usize {
        self.themes.iter().map(|theme| theme.questions.len()).sum()
    }
}

/// Complete question pack as served by the pack provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pack {
    /// Identifier of the pack.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Pack author.
    #[serde(default)]
    pub author: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Rounds in play order.
    pub rounds: Vec<Round>,
}

impl Pack {
    /// Fetch a round by its 1-based number.
    pub fn get_round(&self, round_number: usize) -> Option<&Round> {
        round_number
            .checked_sub(1)
            .and_then(|index| self.rounds.get(index))
    }

    /// Number of rounds in the pack.
    pub fn total_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Number of questions across all rounds.
    pub fn total_questions(&self) -> usize {
        self.rounds.iter().map(Round::total_questions).sum()
    }
}
