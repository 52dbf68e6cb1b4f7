use tracing::warn;
use uuid::Uuid;

use super::{GameManager, SessionState};
use crate::{
    dto::{
        state::{
            ForAllResultView, GameStateSnapshot, PlayerView, QuestionView, RoundOverview,
            StakeView, ThemeView,
        },
        ws::ServerMessage,
    },
    state::state_machine::GameStatus,
};

/// Who a snapshot is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Audience {
    /// The moderator, who always sees the answer.
    Host,
    /// Players and spectators.
    Player,
}

impl GameManager {
    /// Snapshot for the socket of `user_id`.
    pub(super) fn snapshot_for(&self, state: &SessionState, user_id: Uuid) -> GameStateSnapshot {
        let audience = if state.session.is_host(user_id) {
            Audience::Host
        } else {
            Audience::Player
        };
        self.snapshot(state, audience)
    }

    pub(crate) fn snapshot(&self, state: &SessionState, audience: Audience) -> GameStateSnapshot {
        let session = &state.session;
        let status = session.status;
        let round = session.round();

        let current_question = session
            .current_question
            .zip(session.question())
            .map(|(current, question)| {
                let hidden = matches!(
                    status,
                    GameStatus::SecretTransfer | GameStatus::StakeBetting
                );
                let view = QuestionView::new(question, audience == Audience::Host || !hidden)
                    .with_price(current.price);
                if audience == Audience::Host || status == GameStatus::ForAllResults {
                    view.with_answer(&question.answer)
                } else {
                    view
                }
            });

        GameStateSnapshot {
            game_id: self.game_id,
            status,
            current_round: session.current_round,
            round_name: round.map(|round| round.name.clone()),
            themes: round
                .map(|round| {
                    round
                        .themes
                        .iter()
                        .map(|theme| ThemeView::new(theme, false))
                        .collect()
                })
                .unwrap_or_default(),
            players: session.players.values().map(PlayerView::from).collect(),
            active_player: session.active_player,
            current_question,
            time_remaining: self.timer.remaining_secs(),
            all_rounds: (status == GameStatus::RoundsOverview)
                .then(|| session.rounds.iter().map(RoundOverview::from).collect()),
            winners: status
                .is_terminal()
                .then(|| session.winners.clone())
                .filter(|winners| !winners.is_empty()),
            final_scores: status
                .is_terminal()
                .then(|| session.final_scores.clone())
                .filter(|scores| !scores.is_empty()),
            stake_info: (status == GameStatus::StakeBetting)
                .then_some(state.stake.as_ref().map(StakeView::from))
                .flatten(),
            secret_target: state.secret_target,
            for_all_results: (status == GameStatus::ForAllResults).then(|| {
                state
                    .for_all_results
                    .iter()
                    .map(ForAllResultView::from)
                    .collect()
            }),
            for_all_answered: (status == GameStatus::ForAllAnswering)
                .then(|| state.for_all.answered_users()),
            media_progress: (status == GameStatus::RoundStart)
                .then(|| state.media.overall_progress()),
        }
    }

    /// Send the player view to everyone but the host, and the host view to the host.
    pub(super) fn broadcast_state(&self, state: &SessionState) {
        let player_view = self.encode_snapshot(state, Audience::Player);
        match state.session.host_id() {
            Some(host_id) => {
                if let Some(payload) = player_view {
                    self.deps
                        .broadcaster
                        .broadcast_except(self.game_id, host_id, &payload);
                }
                if let Some(payload) = self.encode_snapshot(state, Audience::Host) {
                    self.deps
                        .broadcaster
                        .send_to_user(self.game_id, host_id, &payload);
                }
            }
            None => {
                if let Some(payload) = player_view {
                    self.deps.broadcaster.broadcast(self.game_id, &payload);
                }
            }
        }
    }

    fn encode_snapshot(&self, state: &SessionState, audience: Audience) -> Option<String> {
        let message = ServerMessage::StateUpdate(Box::new(self.snapshot(state, audience)));
        serde_json::to_string(&message)
            .inspect_err(|err| {
                warn!(game_id = %self.game_id, error = %err, "failed to serialize snapshot");
            })
            .ok()
    }
}
