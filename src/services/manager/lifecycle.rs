use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    ActionRejected, GameManager, JUDGING_TIME, MEDIA_START_LEAD, QUESTION_READ_TIME,
    ROUND_END_DELAY, ROUND_INTRO_TIME, ROUNDS_OVERVIEW_TIME, SECRET_TRANSFER_TIME,
    STAKE_BETTING_TIME, ScheduledKind, SessionState,
    scoring::{pick_bettor, rank_players, top_winners},
};
use crate::{
    dto::{
        state::{PressView, duration_millis},
        ws::{
            ButtonPressedPayload, GameCompletePayload, RoundCompletePayload,
            RoundMediaManifestPayload, ServerMessage, StartMediaPayload,
        },
    },
    services::rtt::unix_millis,
    state::{
        event::{EventType, GameEvent},
        game::{CurrentQuestion, StakeInfo},
        pack::{Question, QuestionType, Round},
        state_machine::{GameStatus, InvalidTransition},
    },
};

pub(super) type Transition = Result<(), InvalidTransition>;

/// Time given to read a question: the base read time plus media playback.
pub(super) fn read_time(question: &Question) -> Duration {
    QUESTION_READ_TIME + Duration::from_millis(question.media_duration_ms)
}

pub(super) fn seconds(value: u64) -> Duration {
    Duration::from_secs(value)
}

impl GameManager {
    pub(super) fn set_status(&self, state: &mut SessionState, next: GameStatus) -> Transition {
        let previous = state.session.status;
        state.session.status = previous.transition(next)?;
        state.epoch = state.epoch.wrapping_add(1);
        state.session.touch();
        debug!(game_id = %self.game_id, from = %previous, to = %next, "phase changed");
        Ok(())
    }

    /// Event pre-filled with the round and question in play.
    pub(super) fn session_event(&self, state: &SessionState, event_type: EventType) -> GameEvent {
        let mut event = GameEvent::new(self.game_id, event_type);
        if state.session.current_round > 0 {
            event = event.with_round(state.session.current_round);
        }
        if let Some(question) = state.session.question() {
            event = event.with_question(question.id.clone());
        }
        event
    }

    pub(super) fn start_game(&self, state: &mut SessionState) {
        if let Err(err) = self.set_status(state, GameStatus::RoundsOverview) {
            warn!(game_id = %self.game_id, error = %err, "session cannot start");
            return;
        }
        state.session.started_at = Some(SystemTime::now());
        info!(
            game_id = %self.game_id,
            rounds = state.session.total_rounds(),
            players = state.session.players.len(),
            "session started"
        );
        self.log_event(
            GameEvent::new(self.game_id, EventType::GameStarted)
                .with_data("total_rounds", state.session.total_rounds()),
        );
        self.persist(state);
        self.timer.start(ROUNDS_OVERVIEW_TIME);
        self.broadcast_state(state);
    }

    pub(super) fn start_round(&self, state: &mut SessionState, round_number: usize) -> Transition {
        if round_number > state.session.total_rounds() {
            return self.end_game(state);
        }

        self.timer.stop();
        self.set_status(state, GameStatus::RoundStart)?;
        state.session.current_round = round_number;
        state.session.active_player = None;
        state.session.current_question = None;

        state.media.reset(round_number);
        if let Some(round) = state.session.round() {
            state.media.build_manifest(round);
        }
        let participants: Vec<Uuid> = state.session.players.keys().copied().collect();
        for user_id in participants {
            state.media.register_client(user_id);
        }
        if state.media.has_media() {
            let media = state.media.manifest().to_vec();
            self.broadcast_message(&ServerMessage::RoundMediaManifest(
                RoundMediaManifestPayload {
                    round: round_number,
                    total_size: state.media.total_size(),
                    total_count: media.len(),
                    media,
                },
            ));
        }

        let round_name = state
            .session
            .round()
            .map(|round| round.name.clone())
            .unwrap_or_default();
        info!(
            game_id = %self.game_id,
            round = round_number,
            name = %round_name,
            media = state.media.manifest().len(),
            "round started"
        );
        self.log_event(
            GameEvent::new(self.game_id, EventType::RoundStarted)
                .with_round(round_number)
                .with_data("name", round_name),
        );
        self.persist(state);
        self.timer.start(ROUND_INTRO_TIME);
        self.broadcast_state(state);
        Ok(())
    }

    /// Hand the board to the host, or close the round when nothing is left on it.
    pub(super) fn enter_question_select(&self, state: &mut SessionState) -> Transition {
        if state.session.round().is_none_or(Round::is_complete) {
            return self.end_round(state);
        }
        state.session.active_player = state.session.host_id();
        self.set_status(state, GameStatus::QuestionSelect)?;
        self.timer
            .start(seconds(state.session.settings.time_for_choice));
        self.broadcast_state(state);
        Ok(())
    }

    /// Mark a question used and branch on its type.
    pub(super) fn select_question(
        &self,
        state: &mut SessionState,
        theme_index: usize,
        question_index: usize,
    ) -> Result<(), ActionRejected> {
        let question = state
            .session
            .round_mut()
            .and_then(|round| round.themes.get_mut(theme_index))
            .and_then(|theme| theme.questions.get_mut(question_index))
            .ok_or_else(|| {
                ActionRejected::QuestionUnavailable(format!("{theme_index}/{question_index}"))
            })?;
        if !question.mark_used() {
            return Err(ActionRejected::QuestionUnavailable(question.id.clone()));
        }
        let question = question.clone();

        self.timer.stop();
        state.stake = None;
        state.secret_target = None;
        state.session.current_question = Some(CurrentQuestion {
            theme_index,
            question_index,
            price: question.price,
        });

        info!(
            game_id = %self.game_id,
            question_id = %question.id,
            kind = question.kind.as_str(),
            price = question.price,
            "question selected"
        );
        self.log_event(
            self.session_event(state, EventType::QuestionSelected)
                .with_data("type", question.kind.as_str())
                .with_data("price", question.price)
                .with_data("theme_index", theme_index),
        );

        match question.kind {
            QuestionType::Normal => self.show_question(state)?,
            QuestionType::ForAll => {
                state.for_all.start(&question.answer, question.price);
                self.show_question(state)?;
            }
            QuestionType::Secret => {
                self.set_status(state, GameStatus::SecretTransfer)?;
                self.timer.start(SECRET_TRANSFER_TIME);
                self.broadcast_state(state);
            }
            QuestionType::Stake => self.open_stake(state, question.price)?,
        }
        Ok(())
    }

    fn open_stake(&self, state: &mut SessionState, price: i32) -> Transition {
        let Some((user_id, score)) =
            pick_bettor(&state.session).map(|player| (player.user_id, player.score))
        else {
            info!(game_id = %self.game_id, "no eligible bettor; stake question skipped");
            return self.continue_game(state);
        };

        state.stake = Some(StakeInfo::new(user_id, price, score));
        state.session.active_player = Some(user_id);
        self.set_status(state, GameStatus::StakeBetting)?;
        self.timer.start(STAKE_BETTING_TIME);
        self.broadcast_state(state);
        Ok(())
    }

    /// Reveal the question in play and start its read time.
    pub(super) fn show_question(&self, state: &mut SessionState) -> Transition {
        let Some(question) = state.session.question().cloned() else {
            return self.continue_game(state);
        };

        self.set_status(state, GameStatus::QuestionShow)?;
        self.timer.start(read_time(&question));
        self.broadcast_state(state);
        if question.has_media() {
            self.start_media(state, &question);
        }
        Ok(())
    }

    fn start_media(&self, state: &SessionState, question: &Question) {
        let media_id = state
            .session
            .current_question
            .and_then(|current| {
                state
                    .media
                    .find_media_by_question(current.theme_index, question.price)
            })
            .map(|item| item.id.clone())
            .unwrap_or_else(|| format!("{}_media", question.id));
        let lead = i64::try_from(MEDIA_START_LEAD.as_millis()).unwrap_or_default();
        let start_at = unix_millis().saturating_add(lead);

        debug!(game_id = %self.game_id, %media_id, start_at, "synchronized media start");
        self.broadcast_message(&ServerMessage::StartMedia(StartMediaPayload {
            media_id,
            media_type: question.media_type.clone(),
            url: question.media_url.clone(),
            start_at,
            duration_ms: question.media_duration_ms,
        }));
    }

    pub(super) fn open_buzzer(&self, state: &mut SessionState) -> Transition {
        state.buzzer.reset();
        state.session.active_player = None;
        self.set_status(state, GameStatus::ButtonPress)?;
        self.timer
            .start(seconds(state.session.settings.time_for_answer));
        self.broadcast_state(state);
        Ok(())
    }

    pub(super) fn open_for_all(&self, state: &mut SessionState) -> Transition {
        state.session.active_player = None;
        self.set_status(state, GameStatus::ForAllAnswering)?;
        self.timer
            .start(seconds(state.session.settings.time_for_answer));
        self.broadcast_state(state);
        Ok(())
    }

    pub(super) fn enter_answer_judging(&self, state: &mut SessionState) -> Transition {
        self.set_status(state, GameStatus::AnswerJudging)?;
        self.timer.start(JUDGING_TIME);
        self.broadcast_state(state);
        Ok(())
    }

    /// Close the buzzer window opened by the first press and let the winner answer.
    pub(super) fn finish_button_collection(&self, state: &mut SessionState) -> Transition {
        state.buzzer.close();
        if self.announce_buzzer_winner(state).is_none() {
            return Ok(());
        }
        self.timer.stop();
        self.set_status(state, GameStatus::Answering)?;
        self.timer
            .start(seconds(state.session.settings.time_for_answer));
        self.broadcast_state(state);
        Ok(())
    }

    /// Make the race winner active and tell everyone how the race went.
    pub(super) fn announce_buzzer_winner(&self, state: &mut SessionState) -> Option<Uuid> {
        let winner = state.buzzer.winner()?.clone();
        let presses = state.buzzer.all_presses();
        state.session.active_player = Some(winner.user_id);

        let reaction_time_ms = duration_millis(winner.reaction_time);
        info!(
            game_id = %self.game_id,
            winner = %winner.username,
            reaction_time_ms,
            presses = presses.len(),
            "buzzer race decided"
        );
        self.log_event(
            self.session_event(state, EventType::ButtonPressed)
                .with_user(winner.user_id)
                .with_data("rtt_ms", duration_millis(winner.rtt))
                .with_data("reaction_time_ms", reaction_time_ms)
                .with_data("presses", presses.len()),
        );
        self.broadcast_message(&ServerMessage::ButtonPressed(ButtonPressedPayload {
            winner_id: winner.user_id,
            winner_name: winner.username.clone(),
            reaction_time_ms,
            presses: presses.iter().map(PressView::from).collect(),
        }));
        Some(winner.user_id)
    }

    /// Clear the question in play and return to the board.
    pub(super) fn continue_game(&self, state: &mut SessionState) -> Transition {
        self.timer.stop();
        state.session.current_question = None;
        state.stake = None;
        state.secret_target = None;
        state.for_all.reset();
        state.for_all_results.clear();
        self.persist(state);
        self.enter_question_select(state)
    }

    pub(super) fn end_round(&self, state: &mut SessionState) -> Transition {
        self.timer.stop();
        state.session.active_player = None;
        state.session.current_question = None;
        self.set_status(state, GameStatus::RoundEnd)?;

        let round = state.session.current_round;
        info!(game_id = %self.game_id, round, "round finished");
        self.log_event(GameEvent::new(self.game_id, EventType::RoundFinished).with_round(round));
        self.broadcast_message(&ServerMessage::RoundComplete(RoundCompletePayload {
            round,
            media_progress: state.media.overall_progress(),
        }));
        self.persist(state);
        self.broadcast_state(state);
        self.schedule(state, ScheduledKind::NextRound, ROUND_END_DELAY);
        Ok(())
    }

    pub(super) fn end_game(&self, state: &mut SessionState) -> Transition {
        self.timer.stop();
        self.set_status(state, GameStatus::GameEnd)?;

        let final_scores = rank_players(&state.session);
        let winners = top_winners(&final_scores);
        state.session.final_scores = final_scores.clone();
        state.session.winners = winners.clone();
        state.session.finished_at = Some(SystemTime::now());
        state.session.active_player = None;
        state.session.current_question = None;

        let winner_ids: Vec<String> = winners.iter().map(|w| w.user_id.to_string()).collect();
        info!(game_id = %self.game_id, winners = ?winner_ids, "game finished");
        self.log_event(
            GameEvent::new(self.game_id, EventType::GameFinished).with_data("winners", winner_ids),
        );
        self.broadcast_message(&ServerMessage::GameComplete(GameCompletePayload {
            winners,
            final_scores,
        }));
        self.persist(state);
        self.broadcast_state(state);
        self.release();
        Ok(())
    }

    pub(super) fn cancel_game(&self, state: &mut SessionState) -> Result<(), ActionRejected> {
        self.set_status(state, GameStatus::Cancelled)?;
        self.timer.stop();
        state.session.finished_at = Some(SystemTime::now());
        state.session.active_player = None;

        info!(game_id = %self.game_id, "game cancelled");
        self.log_event(GameEvent::new(self.game_id, EventType::GameCancelled));
        self.persist(state);
        self.broadcast_state(state);
        self.release();
        Ok(())
    }

    pub(super) fn apply_connectivity(&self, state: &mut SessionState, user_id: Uuid, connected: bool) {
        let Some(player) = state.session.players.get_mut(&user_id) else {
            debug!(game_id = %self.game_id, %user_id, "connectivity change of a non-participant ignored");
            return;
        };
        if player.is_connected == connected {
            return;
        }
        player.is_connected = connected;

        info!(game_id = %self.game_id, %user_id, connected, "player connectivity changed");
        let event_type = if connected {
            EventType::PlayerConnected
        } else {
            EventType::PlayerDisconnected
        };
        self.log_event(GameEvent::new(self.game_id, event_type).with_user(user_id));
        self.broadcast_state(state);
    }
}
