use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Phases a live session moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Session created, control loop not started yet.
    Waiting,
    /// Every round of the pack is presented before play begins.
    RoundsOverview,
    /// Intro of the current round while clients preload media.
    RoundStart,
    /// The host picks the next question from the board.
    QuestionSelect,
    /// The selected question is read out (media playing if any).
    QuestionShow,
    /// Buzzer race between eligible players.
    ButtonPress,
    /// The buzzer winner submits an answer.
    Answering,
    /// The host confirms or overrides the verdict.
    AnswerJudging,
    /// Round board exhausted; short pause before the next round.
    RoundEnd,
    /// Final scoreboard.
    GameEnd,
    /// Session closed after the scoreboard.
    Finished,
    /// Session terminated early.
    Cancelled,
    /// The host hands a secret question to another player.
    SecretTransfer,
    /// The selected player places a wager.
    StakeBetting,
    /// Everyone answers the current question independently.
    ForAllAnswering,
    /// Per-player results of the simultaneous question.
    ForAllResults,
}

/// Error returned when a phase change is not part of the session flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {from:?} cannot move to {to:?}")]
pub struct InvalidTransition {
    /// Phase the session was in.
    pub from: GameStatus,
    /// Phase that was requested.
    pub to: GameStatus,
}

impl GameStatus {
    /// Wire name used in snapshots and persisted entities.
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::RoundsOverview => "rounds_overview",
            GameStatus::RoundStart => "round_start",
            GameStatus::QuestionSelect => "question_select",
            GameStatus::QuestionShow => "question_show",
            GameStatus::ButtonPress => "button_press",
            GameStatus::Answering => "answering",
            GameStatus::AnswerJudging => "answer_judging",
            GameStatus::RoundEnd => "round_end",
            GameStatus::GameEnd => "game_end",
            GameStatus::Finished => "finished",
            GameStatus::Cancelled => "cancelled",
            GameStatus::SecretTransfer => "secret_transfer",
            GameStatus::StakeBetting => "stake_betting",
            GameStatus::ForAllAnswering => "for_all_answering",
            GameStatus::ForAllResults => "for_all_results",
        }
    }

    /// Terminal phases never transition again (except `GameEnd -> Finished`).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GameStatus::GameEnd | GameStatus::Finished | GameStatus::Cancelled
        )
    }

    /// Phases where players are expected to act, so remaining time is re-broadcast every tick.
    pub fn awaits_input(self) -> bool {
        matches!(
            self,
            GameStatus::QuestionSelect
                | GameStatus::ButtonPress
                | GameStatus::Answering
                | GameStatus::AnswerJudging
                | GameStatus::SecretTransfer
                | GameStatus::StakeBetting
                | GameStatus::ForAllAnswering
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        use GameStatus::*;

        if next == Cancelled {
            return !matches!(self, Finished | Cancelled);
        }

        match (self, next) {
            (Waiting, RoundsOverview) => true,
            (RoundsOverview, RoundStart | GameEnd) => true,
            (RoundStart, QuestionSelect | RoundEnd) => true,
            (QuestionSelect, QuestionSelect | QuestionShow | SecretTransfer | StakeBetting) => true,
            (QuestionSelect, RoundEnd) => true,
            (QuestionShow, ButtonPress | AnswerJudging | ForAllAnswering) => true,
            (ButtonPress, Answering | AnswerJudging | QuestionSelect | RoundEnd) => true,
            (Answering, AnswerJudging | QuestionSelect | RoundEnd) => true,
            (AnswerJudging, QuestionSelect | RoundEnd) => true,
            (SecretTransfer, QuestionShow | QuestionSelect | RoundEnd) => true,
            (StakeBetting, QuestionShow | QuestionSelect | RoundEnd) => true,
            (ForAllAnswering, ForAllResults) => true,
            (ForAllResults, QuestionSelect | RoundEnd) => true,
            (RoundEnd, RoundStart | GameEnd) => true,
            (GameEnd, Finished) => true,
            _ => false,
        }
    }

    /// Validate a phase change and return the new phase.
    pub fn transition(self, next: GameStatus) -> Result<GameStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
