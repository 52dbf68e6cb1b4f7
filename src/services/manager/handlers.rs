use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    BUTTON_COLLECTION_WINDOW, FOR_ALL_RESULTS_TIME, GameManager, ScheduledKind, SessionState,
    lifecycle::Transition,
    scoring::apply_score,
};
use crate::{
    dto::{
        state::{ForAllResultView, duration_millis},
        ws::{
            AnswerPayload, AnswerResultPayload, ClientAction, ForAllResultsPayload,
            JudgeAnswerPayload, MediaLoadCompletePayload, MediaLoadProgressPayload,
            PlaceStakePayload, SecretTransferredPayload, SelectQuestionPayload, ServerMessage,
            StakePlacedPayload, TransferSecretPayload,
        },
    },
    state::{
        buzzer::PressRejected,
        event::EventType,
        for_all::ForAllRejected,
        pack::normalize_answer,
        state_machine::{GameStatus, InvalidTransition},
    },
};

/// Reason a client action was discarded without changing the session.
#[derive(Debug, Error)]
pub enum ActionRejected {
    /// The action does not belong to the current phase.
    #[error("action not allowed during {0}")]
    WrongPhase(GameStatus),
    /// Only the host may issue the action.
    #[error("only the host can do this")]
    NotHost,
    /// Only the active player may issue the action.
    #[error("only the active player can do this")]
    NotActivePlayer,
    /// The user does not take part in the session.
    #[error("unknown player `{0}`")]
    UnknownPlayer(Uuid),
    /// The user takes part but may not act here (host or inactive player).
    #[error("player `{0}` is not eligible")]
    NotEligible(Uuid),
    /// The question does not exist or was already played.
    #[error("question `{0}` is not available")]
    QuestionUnavailable(String),
    /// The user already acted in this collection.
    #[error("action already recorded")]
    Duplicate,
    /// The collection is no longer accepting input.
    #[error("collection is closed")]
    Closed,
    /// A media report refers to another round than the one being preloaded.
    #[error("media report for round {reported} while round {current} is preloading")]
    StaleRound {
        /// Round named in the report.
        reported: usize,
        /// Round being preloaded.
        current: usize,
    },
    /// The phase change the action would trigger is illegal.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl From<PressRejected> for ActionRejected {
    fn from(err: PressRejected) -> Self {
        match err {
            PressRejected::Closed => ActionRejected::Closed,
            PressRejected::AlreadyPressed => ActionRejected::Duplicate,
        }
    }
}

impl From<ForAllRejected> for ActionRejected {
    fn from(err: ForAllRejected) -> Self {
        match err {
            ForAllRejected::Closed => ActionRejected::Closed,
            ForAllRejected::AlreadyAnswered => ActionRejected::Duplicate,
        }
    }
}

fn expect_phase(state: &SessionState, expected: GameStatus) -> Result<(), ActionRejected> {
    if state.session.status == expected {
        Ok(())
    } else {
        Err(ActionRejected::WrongPhase(state.session.status))
    }
}

fn expect_host(state: &SessionState, user_id: Uuid) -> Result<(), ActionRejected> {
    if !state.session.players.contains_key(&user_id) {
        return Err(ActionRejected::UnknownPlayer(user_id));
    }
    if state.session.is_host(user_id) {
        Ok(())
    } else {
        Err(ActionRejected::NotHost)
    }
}

fn expect_active(state: &SessionState, user_id: Uuid) -> Result<(), ActionRejected> {
    if state.session.active_player == Some(user_id) {
        Ok(())
    } else {
        Err(ActionRejected::NotActivePlayer)
    }
}

/// Participant allowed to buzz and answer, with their display name.
fn eligible_player(state: &SessionState, user_id: Uuid) -> Result<String, ActionRejected> {
    let player = state
        .session
        .players
        .get(&user_id)
        .ok_or(ActionRejected::UnknownPlayer(user_id))?;
    if player.can_press_button() {
        Ok(player.username.clone())
    } else {
        Err(ActionRejected::NotEligible(user_id))
    }
}

impl GameManager {
    pub(super) fn handle_action(
        &self,
        state: &mut SessionState,
        user_id: Uuid,
        action: ClientAction,
    ) -> Result<(), ActionRejected> {
        match action {
            ClientAction::SelectQuestion(payload) => {
                self.handle_select_question(state, user_id, payload)
            }
            ClientAction::PressButton => self.handle_press_button(state, user_id),
            ClientAction::SubmitAnswer(payload) => {
                self.handle_submit_answer(state, user_id, payload)
            }
            ClientAction::JudgeAnswer(payload) => self.handle_judge_answer(state, user_id, payload),
            ClientAction::MediaLoadProgress(payload) => {
                self.handle_media_progress(state, user_id, payload);
                Ok(())
            }
            ClientAction::MediaLoadComplete(payload) => {
                self.handle_media_complete(state, user_id, payload)
            }
            ClientAction::TransferSecret(payload) => {
                self.handle_transfer_secret(state, user_id, payload)
            }
            ClientAction::PlaceStake(payload) => self.handle_place_stake(state, user_id, payload),
            ClientAction::SubmitForAllAnswer(payload) => {
                self.handle_for_all_answer(state, user_id, payload)
            }
        }
    }

    fn handle_select_question(
        &self,
        state: &mut SessionState,
        user_id: Uuid,
        payload: SelectQuestionPayload,
    ) -> Result<(), ActionRejected> {
        expect_phase(state, GameStatus::QuestionSelect)?;
        expect_host(state, user_id)?;

        let unavailable = || ActionRejected::QuestionUnavailable(payload.question_id.clone());
        let round = state.session.round().ok_or_else(unavailable)?;
        let theme_index = round.find_theme(&payload.theme_id).ok_or_else(unavailable)?;
        let question_index = round.themes[theme_index]
            .questions
            .iter()
            .position(|question| question.id == payload.question_id)
            .ok_or_else(unavailable)?;

        self.select_question(state, theme_index, question_index)
    }

    fn handle_press_button(
        &self,
        state: &mut SessionState,
        user_id: Uuid,
    ) -> Result<(), ActionRejected> {
        expect_phase(state, GameStatus::ButtonPress)?;
        let username = eligible_player(state, user_id)?;

        let rtt = self.deps.broadcaster.client_rtt(self.game_id, user_id);
        state.buzzer.press(user_id, &username, rtt)?;
        debug!(
            game_id = %self.game_id,
            %user_id,
            rtt_ms = duration_millis(rtt),
            presses = state.buzzer.press_count(),
            "button pressed"
        );

        if state.buzzer.press_count() == 1 {
            self.schedule(state, ScheduledKind::CloseButtonWindow, BUTTON_COLLECTION_WINDOW);
        }
        Ok(())
    }

    fn handle_submit_answer(
        &self,
        state: &mut SessionState,
        user_id: Uuid,
        payload: AnswerPayload,
    ) -> Result<(), ActionRejected> {
        expect_phase(state, GameStatus::Answering)?;
        expect_active(state, user_id)?;
        let (correct, correct_answer) = state
            .session
            .question()
            .map(|question| (question.validate_answer(&payload.answer), question.answer.clone()))
            .ok_or(ActionRejected::WrongPhase(state.session.status))?;
        let price = self.current_price(state);

        self.timer.stop();
        let delta = if correct { price } else { -price };
        let (_, new_score) = apply_score(&mut state.session, user_id, delta)
            .ok_or(ActionRejected::UnknownPlayer(user_id))?;

        info!(game_id = %self.game_id, %user_id, correct, delta, "answer submitted");
        self.log_event(
            self.session_event(state, EventType::AnswerSubmitted)
                .with_user(user_id)
                .with_data("answer", payload.answer.clone()),
        );
        let verdict = if correct {
            EventType::AnswerCorrect
        } else {
            EventType::AnswerIncorrect
        };
        self.log_event(
            self.session_event(state, verdict)
                .with_user(user_id)
                .with_data("score_delta", delta),
        );
        self.broadcast_message(&ServerMessage::AnswerResult(AnswerResultPayload {
            user_id,
            username: self.username(state, user_id),
            answer: Some(payload.answer),
            correct,
            correct_answer,
            score_delta: delta,
            new_score,
        }));

        Ok(self.enter_answer_judging(state)?)
    }

    fn handle_judge_answer(
        &self,
        state: &mut SessionState,
        user_id: Uuid,
        payload: JudgeAnswerPayload,
    ) -> Result<(), ActionRejected> {
        expect_phase(state, GameStatus::AnswerJudging)?;
        expect_host(state, user_id)?;
        let target = payload.user_id;
        match state.session.players.get(&target) {
            None => return Err(ActionRejected::UnknownPlayer(target)),
            Some(player) if player.is_host() => return Err(ActionRejected::NotEligible(target)),
            Some(_) => {}
        }

        let price = self.current_price(state);
        let delta = if payload.correct { price } else { -price };
        let (_, new_score) = apply_score(&mut state.session, target, delta)
            .ok_or(ActionRejected::UnknownPlayer(target))?;

        info!(game_id = %self.game_id, user_id = %target, correct = payload.correct, delta, "answer judged");
        self.log_event(
            self.session_event(state, EventType::AnswerJudged)
                .with_user(target)
                .with_data("correct", payload.correct)
                .with_data("score_delta", delta),
        );
        self.broadcast_message(&ServerMessage::AnswerResult(AnswerResultPayload {
            user_id: target,
            username: self.username(state, target),
            answer: None,
            correct: payload.correct,
            correct_answer: self.correct_answer(state),
            score_delta: delta,
            new_score,
        }));

        Ok(self.continue_game(state)?)
    }

    fn handle_media_progress(
        &self,
        state: &mut SessionState,
        user_id: Uuid,
        payload: MediaLoadProgressPayload,
    ) {
        let tracked = state.media.update_progress(
            user_id,
            payload.loaded,
            payload.total,
            payload.bytes_loaded,
            payload.percent,
        );
        if !tracked {
            debug!(game_id = %self.game_id, %user_id, "media progress from a non-participant ignored");
            return;
        }
        debug!(
            game_id = %self.game_id,
            %user_id,
            percent = payload.percent,
            loaded = payload.loaded,
            total = payload.total,
            "media preload progress"
        );
        if state.session.status == GameStatus::RoundStart {
            self.broadcast_state(state);
        }
    }

    fn handle_media_complete(
        &self,
        state: &mut SessionState,
        user_id: Uuid,
        payload: MediaLoadCompletePayload,
    ) -> Result<(), ActionRejected> {
        let current = state.media.round_number();
        if let Some(reported) = payload.round.filter(|reported| *reported != current) {
            return Err(ActionRejected::StaleRound { reported, current });
        }

        if !state.media.mark_complete(user_id, payload.loaded_count) {
            return Err(ActionRejected::UnknownPlayer(user_id));
        }
        debug!(game_id = %self.game_id, %user_id, loaded = payload.loaded_count, "media preload complete");
        if state.media.all_clients_ready() {
            info!(game_id = %self.game_id, round = current, "all clients preloaded round media");
        }
        if state.session.status == GameStatus::RoundStart {
            self.broadcast_state(state);
        }
        Ok(())
    }

    fn handle_transfer_secret(
        &self,
        state: &mut SessionState,
        user_id: Uuid,
        payload: TransferSecretPayload,
    ) -> Result<(), ActionRejected> {
        expect_phase(state, GameStatus::SecretTransfer)?;
        expect_host(state, user_id)?;
        eligible_player(state, payload.target_user_id)?;

        Ok(self.transfer_secret(state, payload.target_user_id, Some(user_id))?)
    }

    /// Hand the secret question to `target` and reveal it.
    pub(super) fn transfer_secret(
        &self,
        state: &mut SessionState,
        target: Uuid,
        from: Option<Uuid>,
    ) -> Transition {
        self.timer.stop();
        state.session.active_player = Some(target);
        state.secret_target = Some(target);

        let to_username = self.username(state, target);
        info!(game_id = %self.game_id, to = %to_username, automatic = from.is_none(), "secret question transferred");
        let mut event = self
            .session_event(state, EventType::SecretTransferred)
            .with_user(target);
        if let Some(from) = from {
            event = event.with_data("from_user_id", from.to_string());
        }
        self.log_event(event);
        self.broadcast_message(&ServerMessage::SecretTransferred(SecretTransferredPayload {
            from_user_id: from,
            to_user_id: target,
            to_username,
        }));

        self.show_question(state)
    }

    fn handle_place_stake(
        &self,
        state: &mut SessionState,
        user_id: Uuid,
        payload: PlaceStakePayload,
    ) -> Result<(), ActionRejected> {
        expect_phase(state, GameStatus::StakeBetting)?;
        let bettor = state.stake.map(|stake| stake.user_id);
        if bettor != Some(user_id) {
            return Err(ActionRejected::NotActivePlayer);
        }

        Ok(self.place_stake(state, payload.amount, payload.all_in)?)
    }

    /// Record the bet of the current bettor, make it the effective price and reveal the question.
    pub(super) fn place_stake(&self, state: &mut SessionState, amount: i32, all_in: bool) -> Transition {
        let Some(mut stake) = state.stake else {
            return self.continue_game(state);
        };
        let score = state
            .session
            .players
            .get(&stake.user_id)
            .map(|player| player.score)
            .unwrap_or_default();
        let bet = stake.place(amount, all_in, score);
        state.stake = Some(stake);
        if let Some(current) = state.session.current_question.as_mut() {
            current.price = bet;
        }

        self.timer.stop();
        info!(game_id = %self.game_id, user_id = %stake.user_id, bet, all_in, "stake placed");
        self.log_event(
            self.session_event(state, EventType::StakePlaced)
                .with_user(stake.user_id)
                .with_data("amount", bet)
                .with_data("all_in", all_in),
        );
        self.broadcast_message(&ServerMessage::StakePlaced(StakePlacedPayload {
            user_id: stake.user_id,
            amount: bet,
            all_in,
        }));

        self.show_question(state)
    }

    fn handle_for_all_answer(
        &self,
        state: &mut SessionState,
        user_id: Uuid,
        payload: AnswerPayload,
    ) -> Result<(), ActionRejected> {
        expect_phase(state, GameStatus::ForAllAnswering)?;
        let username = eligible_player(state, user_id)?;

        let collected = state.for_all.submit(user_id, &username, &payload.answer)?;
        let expected = state.session.eligible_players().count();
        debug!(game_id = %self.game_id, %user_id, collected, expected, "simultaneous answer collected");

        if collected >= expected {
            self.timer.stop();
            return Ok(self.finish_for_all(state)?);
        }
        self.broadcast_state(state);
        Ok(())
    }

    /// Score every collected answer and show the results.
    pub(super) fn finish_for_all(&self, state: &mut SessionState) -> Transition {
        state.for_all.close();
        let results = state
            .for_all
            .results(|submitted, correct| normalize_answer(submitted) == normalize_answer(correct));
        for result in &results {
            apply_score(&mut state.session, result.user_id, result.score_delta);
        }
        let correct_count = results.iter().filter(|result| result.is_correct).count();
        let correct_answer = state.for_all.correct_answer().to_owned();

        self.set_status(state, GameStatus::ForAllResults)?;
        info!(
            game_id = %self.game_id,
            answers = results.len(),
            correct = correct_count,
            "simultaneous question scored"
        );
        self.log_event(
            self.session_event(state, EventType::ForAllCompleted)
                .with_data("answers", results.len())
                .with_data("correct", correct_count),
        );
        self.broadcast_message(&ServerMessage::ForAllResults(ForAllResultsPayload {
            correct_answer,
            results: results.iter().map(ForAllResultView::from).collect(),
        }));
        state.for_all_results = results;

        self.timer.start(FOR_ALL_RESULTS_TIME);
        self.broadcast_state(state);
        Ok(())
    }

    /// Price in effect for the question in play.
    pub(super) fn current_price(&self, state: &SessionState) -> i32 {
        state
            .session
            .current_question
            .map(|current| current.price)
            .unwrap_or_default()
    }

    pub(super) fn correct_answer(&self, state: &SessionState) -> String {
        state
            .session
            .question()
            .map(|question| question.answer.clone())
            .unwrap_or_default()
    }

    pub(super) fn username(&self, state: &SessionState, user_id: Uuid) -> String {
        state
            .session
            .players
            .get(&user_id)
            .map(|player| player.username.clone())
            .unwrap_or_default()
    }
}
