use tracing::{info, warn};

use super::{
    GameManager, SessionState,
    lifecycle::Transition,
    scoring::{apply_score, first_eligible},
};
use crate::{
    dto::ws::{AnswerResultPayload, ServerMessage},
    state::{event::EventType, pack::QuestionType, state_machine::GameStatus},
};

impl GameManager {
    /// React to the phase timer elapsing.
    pub(super) fn handle_timeout(&self, state: &mut SessionState) {
        let status = state.session.status;
        info!(game_id = %self.game_id, %status, "phase timer expired");

        let result = match status {
            GameStatus::RoundsOverview => self.start_round(state, 1),
            GameStatus::RoundStart => self.enter_question_select(state),
            GameStatus::QuestionSelect => self.auto_select_question(state),
            GameStatus::QuestionShow => self.leave_question_show(state),
            GameStatus::ButtonPress => self.close_buzzer(state),
            GameStatus::Answering | GameStatus::AnswerJudging => self.expire_answer(state),
            GameStatus::SecretTransfer => self.auto_transfer_secret(state),
            GameStatus::StakeBetting => self.place_minimum_stake(state),
            GameStatus::ForAllAnswering => self.finish_for_all(state),
            GameStatus::ForAllResults => self.continue_game(state),
            GameStatus::Waiting
            | GameStatus::RoundEnd
            | GameStatus::GameEnd
            | GameStatus::Finished
            | GameStatus::Cancelled => Ok(()),
        };

        if let Err(err) = result {
            warn!(game_id = %self.game_id, %status, error = %err, "timeout transition failed");
        }
    }

    /// The host did not pick in time: play the first question still on the board.
    fn auto_select_question(&self, state: &mut SessionState) -> Transition {
        let Some((theme_index, question_index)) =
            state.session.round().and_then(|round| round.first_available())
        else {
            return self.end_round(state);
        };

        info!(game_id = %self.game_id, theme_index, question_index, "question picked automatically");
        if let Err(err) = self.select_question(state, theme_index, question_index) {
            warn!(game_id = %self.game_id, error = %err, "automatic selection failed");
            return self.continue_game(state);
        }
        Ok(())
    }

    fn leave_question_show(&self, state: &mut SessionState) -> Transition {
        match state.session.question().map(|question| question.kind) {
            Some(QuestionType::ForAll) => self.open_for_all(state),
            Some(QuestionType::Secret | QuestionType::Stake) => self.enter_answer_judging(state),
            Some(QuestionType::Normal) | None => self.open_buzzer(state),
        }
    }

    /// Buzzer time is up: a pending press still wins, otherwise the question is skipped.
    fn close_buzzer(&self, state: &mut SessionState) -> Transition {
        state.buzzer.close();
        if self.announce_buzzer_winner(state).is_some() {
            return self.enter_answer_judging(state);
        }
        info!(game_id = %self.game_id, "nobody pressed the button; question skipped");
        self.continue_game(state)
    }

    /// Nobody answered or judged in time: the active player loses the price.
    fn expire_answer(&self, state: &mut SessionState) -> Transition {
        if let Some(user_id) = state.session.active_player {
            let price = self.current_price(state);
            if let Some((_, new_score)) = apply_score(&mut state.session, user_id, -price) {
                info!(game_id = %self.game_id, %user_id, penalty = price, "answer time expired");
                self.log_event(
                    self.session_event(state, EventType::AnswerIncorrect)
                        .with_user(user_id)
                        .with_data("score_delta", -price)
                        .with_data("timeout", true),
                );
                self.broadcast_message(&ServerMessage::AnswerResult(AnswerResultPayload {
                    user_id,
                    username: self.username(state, user_id),
                    answer: None,
                    correct: false,
                    correct_answer: self.correct_answer(state),
                    score_delta: -price,
                    new_score,
                }));
            }
        }
        self.continue_game(state)
    }

    /// The host did not hand the secret over: it goes to the earliest joined player.
    fn auto_transfer_secret(&self, state: &mut SessionState) -> Transition {
        match first_eligible(&state.session) {
            Some(target) => self.transfer_secret(state, target, None),
            None => {
                info!(game_id = %self.game_id, "no player can receive the secret question");
                self.continue_game(state)
            }
        }
    }

    /// The bettor did not bet: the minimum is placed for them.
    fn place_minimum_stake(&self, state: &mut SessionState) -> Transition {
        let minimum = state.stake.map(|stake| stake.min_bet).unwrap_or_default();
        self.place_stake(state, minimum, false)
    }
}
