//! Per-session orchestration engine.
//!
//! Each session is owned by one [`GameManager`]. Every mutation (client actions,
//! connectivity changes, timer fires and delayed transitions) is funnelled through the
//! manager's control loop, which is the single writer of the session state.

mod handlers;
mod lifecycle;
mod scoring;
mod snapshot;
mod timeouts;

#[cfg(test)]
mod tests;

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{
    sync::{RwLock, mpsc, watch},
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        event_log::EventLogger,
        game_store::{GameCache, GameRepository},
        models::GameEntity,
        storage::StorageResult,
    },
    dto::ws::{ClientAction, ServerMessage},
    services::hub::{ClientHandle, SessionBroadcaster},
    state::{
        buzzer::ButtonPressArbitrator,
        event::GameEvent,
        for_all::{ForAllCollector, ForAllResult},
        game::{Session, StakeInfo},
        media::MediaTracker,
        state_machine::GameStatus,
        timer::{PhaseTimer, TimerFired},
    },
};

pub use self::handlers::ActionRejected;
pub use self::scoring::{rank_players, top_winners};

/// Capacity of the per-session command queue.
pub const ACTION_QUEUE_CAPACITY: usize = 100;
/// Cadence of the countdown refresh broadcast.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Duration of the rounds overview.
pub const ROUNDS_OVERVIEW_TIME: Duration = Duration::from_secs(5);
/// Duration of the round intro.
pub const ROUND_INTRO_TIME: Duration = Duration::from_secs(3);
/// Base read time of a question, before media playback.
pub const QUESTION_READ_TIME: Duration = Duration::from_secs(3);
/// Time left to the host to judge an answer.
pub const JUDGING_TIME: Duration = Duration::from_secs(30);
/// Time left to the host to hand a secret question over.
pub const SECRET_TRANSFER_TIME: Duration = Duration::from_secs(30);
/// Time left to the bettor to place a stake.
pub const STAKE_BETTING_TIME: Duration = Duration::from_secs(20);
/// Window held open after the first buzz to collect near-simultaneous presses.
pub const BUTTON_COLLECTION_WINDOW: Duration = Duration::from_millis(150);
/// Duration of the simultaneous question results.
pub const FOR_ALL_RESULTS_TIME: Duration = Duration::from_secs(5);
/// Pause between the end of a round and the next one.
pub const ROUND_END_DELAY: Duration = Duration::from_secs(5);
/// Lead given to clients before synchronized media playback.
pub const MEDIA_START_LEAD: Duration = Duration::from_millis(300);

/// Collaborators a manager reports to.
#[derive(Clone)]
pub struct ManagerDeps {
    /// Socket fan-out.
    pub broadcaster: Arc<dyn SessionBroadcaster>,
    /// Audit trail.
    pub events: Arc<dyn EventLogger>,
    /// Durable session records.
    pub repository: Arc<dyn GameRepository>,
    /// Expiring copy of the live state.
    pub cache: Arc<dyn GameCache>,
}

/// Mutable state of a session, only touched by the control loop.
pub(crate) struct SessionState {
    pub(crate) session: Session,
    /// Incremented on every phase change; lets delayed transitions detect staleness.
    pub(crate) epoch: u64,
    pub(crate) buzzer: ButtonPressArbitrator,
    pub(crate) for_all: ForAllCollector,
    pub(crate) for_all_results: Vec<ForAllResult>,
    pub(crate) media: MediaTracker,
    pub(crate) stake: Option<StakeInfo>,
    pub(crate) secret_target: Option<Uuid>,
}

impl SessionState {
    fn new(session: Session) -> Self {
        Self {
            session,
            epoch: 0,
            buzzer: ButtonPressArbitrator::new(),
            for_all: ForAllCollector::new(),
            for_all_results: Vec::new(),
            media: MediaTracker::new(),
            stake: None,
            secret_target: None,
        }
    }
}

#[derive(Debug)]
enum Command {
    Action { user_id: Uuid, action: ClientAction },
    Connectivity { user_id: Uuid, connected: bool },
    Scheduled(Scheduled),
}

/// Transition posted back to the queue after a delay.
#[derive(Debug, Clone, Copy)]
struct Scheduled {
    status: GameStatus,
    round: usize,
    epoch: u64,
    kind: ScheduledKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduledKind {
    CloseButtonWindow,
    NextRound,
}

impl Scheduled {
    fn still_valid(&self, state: &SessionState) -> bool {
        state.session.status == self.status
            && state.session.current_round == self.round
            && state.epoch == self.epoch
    }
}

struct Receivers {
    commands: mpsc::Receiver<Command>,
    timer: mpsc::Receiver<TimerFired>,
}

/// Owner of one running session.
pub struct GameManager {
    game_id: Uuid,
    state: RwLock<SessionState>,
    timer: PhaseTimer,
    deps: ManagerDeps,
    commands: mpsc::Sender<Command>,
    receivers: Mutex<Option<Receivers>>,
    shutdown: watch::Sender<bool>,
}

impl GameManager {
    /// Wrap a waiting session. Nothing runs until [`GameManager::start`] is called.
    pub fn new(session: Session, deps: ManagerDeps) -> Arc<Self> {
        let (commands, commands_rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);
        let (timer, timer_rx) = PhaseTimer::new();
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            game_id: session.id,
            state: RwLock::new(SessionState::new(session)),
            timer,
            deps,
            commands,
            receivers: Mutex::new(Some(Receivers {
                commands: commands_rx,
                timer: timer_rx,
            })),
            shutdown,
        })
    }

    /// Session identifier.
    pub fn game_id(&self) -> Uuid {
        self.game_id
    }

    /// Spawn the control loop and enter the rounds overview. Later calls are no-ops.
    pub async fn start(self: &Arc<Self>) {
        let receivers = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(receivers) = receivers else {
            debug!(game_id = %self.game_id, "session already started");
            return;
        };

        let mut state = self.state.write().await;
        self.start_game(&mut state);
        drop(state);

        tokio::spawn(Arc::clone(self).run(receivers, self.shutdown.subscribe()));
    }

    /// Stop the control loop and the phase timer. Idempotent.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            info!(game_id = %self.game_id, "session manager stopped");
        }
        self.timer.stop();
    }

    /// Whether [`GameManager::stop`] was called.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Abort the session: enter `Cancelled`, notify clients, persist and stop.
    pub async fn cancel(&self) -> Result<(), ActionRejected> {
        let mut state = self.state.write().await;
        self.cancel_game(&mut state)?;
        Ok(())
    }

    /// Enqueue a client action for the control loop.
    pub async fn handle_client_message(&self, user_id: Uuid, action: ClientAction) {
        self.enqueue(Command::Action { user_id, action }).await;
    }

    /// Enqueue a connectivity change of `user_id`.
    pub async fn set_player_connected(&self, user_id: Uuid, connected: bool) {
        self.enqueue(Command::Connectivity { user_id, connected })
            .await;
    }

    /// Send the snapshot matching the audience of `client` to that socket only.
    pub async fn send_state_to_client(&self, client: &ClientHandle) {
        let state = self.state.read().await;
        let snapshot = self.snapshot_for(&state, client.user_id);
        drop(state);
        if let Err(err) = client.send_message(&ServerMessage::StateUpdate(Box::new(snapshot))) {
            debug!(game_id = %self.game_id, user_id = %client.user_id, error = %err, "initial snapshot not delivered");
        }
    }

    /// Current phase.
    pub async fn status(&self) -> GameStatus {
        self.state.read().await.session.status
    }

    /// Persistable copy of the session.
    pub async fn entity(&self) -> GameEntity {
        GameEntity::from(&self.state.read().await.session)
    }

    async fn enqueue(&self, command: Command) {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            debug!(game_id = %self.game_id, ?command, "session stopped; command dropped");
            return;
        }
        tokio::select! {
            sent = self.commands.send(command) => {
                if sent.is_err() {
                    warn!(game_id = %self.game_id, "command queue closed");
                }
            }
            _ = shutdown.changed() => {}
        }
    }

    async fn run(self: Arc<Self>, mut receivers: Receivers, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(game_id = %self.game_id, "control loop started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => continue,
                Some(command) = receivers.commands.recv() => {
                    let mut state = self.state.write().await;
                    self.dispatch(&mut state, command);
                }
                Some(fired) = receivers.timer.recv() => {
                    if self.timer.accept(fired) {
                        let mut state = self.state.write().await;
                        self.handle_timeout(&mut state);
                    }
                }
                _ = ticker.tick() => {
                    let state = self.state.read().await;
                    if state.session.status.awaits_input() {
                        self.broadcast_state(&state);
                    }
                }
            }
        }
        debug!(game_id = %self.game_id, "control loop exited");
    }

    fn dispatch(&self, state: &mut SessionState, command: Command) {
        match command {
            Command::Action { user_id, action } => {
                let kind = action.kind();
                if let Err(err) = self.handle_action(state, user_id, action) {
                    warn!(
                        game_id = %self.game_id,
                        %user_id,
                        action = kind,
                        status = %state.session.status,
                        error = %err,
                        "client action rejected"
                    );
                }
            }
            Command::Connectivity { user_id, connected } => {
                self.apply_connectivity(state, user_id, connected);
            }
            Command::Scheduled(scheduled) => {
                if !scheduled.still_valid(state) {
                    debug!(game_id = %self.game_id, kind = ?scheduled.kind, "stale delayed transition ignored");
                    return;
                }
                let result = match scheduled.kind {
                    ScheduledKind::CloseButtonWindow => self.finish_button_collection(state),
                    ScheduledKind::NextRound => {
                        let next = state.session.current_round + 1;
                        self.start_round(state, next)
                    }
                };
                if let Err(err) = result {
                    warn!(game_id = %self.game_id, kind = ?scheduled.kind, error = %err, "delayed transition failed");
                }
            }
        }
    }

    /// Post `kind` back to the queue after `delay`, bound to the current phase.
    fn schedule(&self, state: &SessionState, kind: ScheduledKind, delay: Duration) {
        let scheduled = Scheduled {
            status: state.session.status,
            round: state.session.current_round,
            epoch: state.epoch,
            kind,
        };
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::Scheduled(scheduled)).await;
        });
    }

    fn broadcast_message(&self, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(payload) => self.deps.broadcaster.broadcast(self.game_id, &payload),
            Err(err) => {
                warn!(game_id = %self.game_id, kind = message.kind(), error = %err, "failed to serialize server message");
            }
        }
    }

    /// Stop the session for good and let the hub forget it.
    fn release(&self) {
        self.stop();
        self.deps.broadcaster.release_session(self.game_id);
    }

    /// Record an event without waiting for the logger.
    fn log_event(&self, event: GameEvent) {
        spawn_logged(
            self.game_id,
            "failed to log game event",
            self.deps.events.log_event(event),
        );
    }

    /// Save the session to the repository and the cache without waiting for either.
    fn persist(&self, state: &SessionState) {
        let entity = GameEntity::from(&state.session);
        spawn_logged(
            self.game_id,
            "failed to update game session",
            self.deps.repository.update_game_session(entity.clone()),
        );
        spawn_logged(
            self.game_id,
            "failed to cache game state",
            self.deps.cache.save_game_state(entity),
        );
    }
}

fn spawn_logged(game_id: Uuid, context: &'static str, task: BoxFuture<'static, StorageResult<()>>) {
    tokio::spawn(async move {
        if let Err(err) = task.await {
            warn!(%game_id, error = %err, "{context}");
        }
    });
}
