use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::Value;
use uuid::Uuid;

use super::*;
use crate::{
    dao::{event_log::RecordingEventLogger, game_store::MemoryGameStore},
    dto::ws::{
        AnswerPayload, JudgeAnswerPayload, MediaLoadCompletePayload, MediaLoadProgressPayload,
        PlaceStakePayload, SelectQuestionPayload, TransferSecretPayload,
    },
    state::{
        event::EventType,
        game::{Player, Role, Settings},
        pack::{Pack, QuestionType, tests::sample_pack},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    All,
    AllExcept(Uuid),
    User(Uuid),
}

#[derive(Default)]
struct RecordingBroadcaster {
    frames: Mutex<Vec<(Target, Value)>>,
    rtts: Mutex<HashMap<Uuid, Duration>>,
    released: Mutex<Vec<Uuid>>,
}

impl RecordingBroadcaster {
    fn record(&self, target: Target, payload: &str) {
        let frame = serde_json::from_str(payload).expect("frames are JSON");
        self.frames.lock().unwrap().push((target, frame));
    }

    fn payloads(&self, kind: &str) -> Vec<Value> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, frame)| frame["type"] == kind)
            .map(|(_, frame)| frame["payload"].clone())
            .collect()
    }

    fn last_state(&self, target: Target) -> Value {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, frame)| *to == target && frame["type"] == "STATE_UPDATE")
            .map(|(_, frame)| frame["payload"].clone())
            .expect("a snapshot was sent")
    }

    fn set_rtt(&self, user_id: Uuid, rtt: Duration) {
        self.rtts.lock().unwrap().insert(user_id, rtt);
    }
}

impl SessionBroadcaster for RecordingBroadcaster {
    fn broadcast(&self, _game_id: Uuid, payload: &str) {
        self.record(Target::All, payload);
    }

    fn broadcast_except(&self, _game_id: Uuid, excluded_user: Uuid, payload: &str) {
        self.record(Target::AllExcept(excluded_user), payload);
    }

    fn send_to_user(&self, _game_id: Uuid, user_id: Uuid, payload: &str) {
        self.record(Target::User(user_id), payload);
    }

    fn client_rtt(&self, _game_id: Uuid, user_id: Uuid) -> Duration {
        self.rtts
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or_default()
    }

    fn release_session(&self, game_id: Uuid) {
        self.released.lock().unwrap().push(game_id);
    }
}

struct Fixture {
    manager: Arc<GameManager>,
    broadcaster: Arc<RecordingBroadcaster>,
    events: RecordingEventLogger,
    host: Uuid,
    players: Vec<Uuid>,
}

impl Fixture {
    fn new(kinds: &[QuestionType], scores: &[i32]) -> Self {
        Self::with_pack(sample_pack(kinds), scores)
    }

    fn with_pack(pack: Pack, scores: &[i32]) -> Self {
        let mut session = Session::new(Uuid::new_v4(), pack.id, Settings::default(), pack.rounds);
        let host = Uuid::new_v4();
        session
            .add_player(Player::new(host, "host".into(), None, Role::Host))
            .unwrap();
        let players = scores
            .iter()
            .enumerate()
            .map(|(idx, score)| {
                let user_id = Uuid::new_v4();
                let mut player = Player::new(user_id, format!("player{}", idx + 1), None, Role::Player);
                player.score = *score;
                session.add_player(player).unwrap();
                user_id
            })
            .collect();

        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let events = RecordingEventLogger::default();
        let store = MemoryGameStore::new(Duration::from_secs(60));
        let deps = ManagerDeps {
            broadcaster: broadcaster.clone(),
            events: Arc::new(events.clone()),
            repository: Arc::new(store.clone()),
            cache: Arc::new(store),
        };

        Self {
            manager: GameManager::new(session, deps),
            broadcaster,
            events,
            host,
            players,
        }
    }

    fn player(&self, idx: usize) -> Uuid {
        self.players[idx]
    }

    async fn act(&self, user_id: Uuid, action: ClientAction) -> Result<(), ActionRejected> {
        let mut state = self.manager.state.write().await;
        self.manager.handle_action(&mut state, user_id, action)
    }

    async fn timeout(&self) {
        let mut state = self.manager.state.write().await;
        self.manager.handle_timeout(&mut state);
    }

    async fn to_question_select(&self) {
        let mut state = self.manager.state.write().await;
        self.manager.start_game(&mut state);
        self.manager.start_round(&mut state, 1).unwrap();
        self.manager.enter_question_select(&mut state).unwrap();
    }

    async fn select(&self, question_id: &str) -> Result<(), ActionRejected> {
        self.act(
            self.host,
            ClientAction::SelectQuestion(SelectQuestionPayload {
                theme_id: "t1".into(),
                question_id: question_id.into(),
            }),
        )
        .await
    }

    async fn status(&self) -> GameStatus {
        self.manager.status().await
    }

    async fn score(&self, user_id: Uuid) -> i32 {
        self.manager.state.read().await.session.players[&user_id].score
    }

    async fn close_button_window(&self) {
        let mut state = self.manager.state.write().await;
        self.manager.finish_button_collection(&mut state).unwrap();
    }

    fn event_types(&self) -> Vec<EventType> {
        self.events
            .events_for(self.manager.game_id())
            .into_iter()
            .map(|event| event.event_type)
            .collect()
    }
}

fn answer(text: &str) -> AnswerPayload {
    AnswerPayload {
        answer: text.into(),
    }
}

fn judge(user_id: Uuid, correct: bool) -> ClientAction {
    ClientAction::JudgeAnswer(JudgeAnswerPayload { user_id, correct })
}

#[tokio::test(start_paused = true)]
async fn normal_question_correct_answer_scores_price() {
    let f = Fixture::new(&[QuestionType::Normal], &[0]);
    f.to_question_select().await;
    assert_eq!(f.status().await, GameStatus::QuestionSelect);

    f.select("q1").await.unwrap();
    assert_eq!(f.status().await, GameStatus::QuestionShow);
    f.timeout().await;
    assert_eq!(f.status().await, GameStatus::ButtonPress);

    f.act(f.player(0), ClientAction::PressButton).await.unwrap();
    f.close_button_window().await;
    assert_eq!(f.status().await, GameStatus::Answering);
    let pressed = f.broadcaster.payloads("BUTTON_PRESSED");
    assert_eq!(pressed.len(), 1);
    assert_eq!(pressed[0]["winner_id"], f.player(0).to_string());

    f.act(f.player(0), ClientAction::SubmitAnswer(answer("  Paris ")))
        .await
        .unwrap();
    assert_eq!(f.score(f.player(0)).await, 100);
    assert_eq!(f.status().await, GameStatus::AnswerJudging);
    let result = &f.broadcaster.payloads("ANSWER_RESULT")[0];
    assert_eq!(result["correct"], true);
    assert_eq!(result["score_delta"], 100);
    assert_eq!(result["correct_answer"], "paris");

    // the host verdict is applied on top of the automatic one
    f.act(f.host, judge(f.player(0), true)).await.unwrap();
    assert_eq!(f.score(f.player(0)).await, 200);
    assert_eq!(f.status().await, GameStatus::RoundEnd);
    assert_eq!(f.broadcaster.payloads("ROUND_COMPLETE").len(), 1);

    let events = f.event_types();
    assert!(events.contains(&EventType::QuestionSelected));
    assert!(events.contains(&EventType::ButtonPressed));
    assert!(events.contains(&EventType::AnswerCorrect));
    assert!(events.contains(&EventType::AnswerJudged));
}

#[tokio::test(start_paused = true)]
async fn host_verdict_adds_price_after_automatic_score() {
    let f = Fixture::new(&[QuestionType::Normal, QuestionType::Normal], &[50]);
    f.to_question_select().await;
    f.select("q1").await.unwrap();
    f.timeout().await;
    f.act(f.player(0), ClientAction::PressButton).await.unwrap();
    f.close_button_window().await;

    f.act(f.player(0), ClientAction::SubmitAnswer(answer("Lyon")))
        .await
        .unwrap();
    assert_eq!(f.score(f.player(0)).await, 0);

    f.act(f.host, judge(f.player(0), true)).await.unwrap();
    assert_eq!(f.score(f.player(0)).await, 100);
    assert_eq!(f.status().await, GameStatus::QuestionSelect);
    let results = f.broadcaster.payloads("ANSWER_RESULT");
    assert_eq!(results.len(), 2);
    assert_eq!(results[1]["score_delta"], 100);
    assert_eq!(results[1]["new_score"], 100);
}

#[tokio::test(start_paused = true)]
async fn judging_timeout_penalizes_after_automatic_score() {
    let f = Fixture::new(&[QuestionType::Normal, QuestionType::Normal], &[0]);
    f.to_question_select().await;
    f.select("q1").await.unwrap();
    f.timeout().await;
    f.act(f.player(0), ClientAction::PressButton).await.unwrap();
    f.close_button_window().await;

    f.act(f.player(0), ClientAction::SubmitAnswer(answer("Paris")))
        .await
        .unwrap();
    assert_eq!(f.score(f.player(0)).await, 100);
    assert_eq!(f.status().await, GameStatus::AnswerJudging);

    f.timeout().await;
    assert_eq!(f.score(f.player(0)).await, 0);
    assert_eq!(f.status().await, GameStatus::QuestionSelect);
    let penalty = f.broadcaster.payloads("ANSWER_RESULT").pop().unwrap();
    assert_eq!(penalty["score_delta"], -100);
    assert_eq!(penalty["correct"], false);
}

#[tokio::test(start_paused = true)]
async fn actions_are_guarded_by_phase_role_and_identity() {
    let f = Fixture::new(&[QuestionType::Normal, QuestionType::Normal], &[0, 0]);
    f.to_question_select().await;

    assert!(matches!(
        f.act(f.player(0), ClientAction::PressButton).await,
        Err(ActionRejected::WrongPhase(GameStatus::QuestionSelect))
    ));
    assert!(matches!(
        f.act(
            f.player(0),
            ClientAction::SelectQuestion(SelectQuestionPayload {
                theme_id: "t1".into(),
                question_id: "q1".into(),
            })
        )
        .await,
        Err(ActionRejected::NotHost)
    ));
    assert!(matches!(
        f.select("missing").await,
        Err(ActionRejected::QuestionUnavailable(_))
    ));

    f.select("q1").await.unwrap();
    f.timeout().await;

    assert!(matches!(
        f.act(f.host, ClientAction::PressButton).await,
        Err(ActionRejected::NotEligible(_))
    ));
    let stranger = Uuid::new_v4();
    assert!(matches!(
        f.act(stranger, ClientAction::PressButton).await,
        Err(ActionRejected::UnknownPlayer(id)) if id == stranger
    ));
    f.act(f.player(0), ClientAction::PressButton).await.unwrap();
    assert!(matches!(
        f.act(f.player(0), ClientAction::PressButton).await,
        Err(ActionRejected::Duplicate)
    ));

    f.close_button_window().await;
    assert!(matches!(
        f.act(f.player(1), ClientAction::SubmitAnswer(answer("paris")))
            .await,
        Err(ActionRejected::NotActivePlayer)
    ));
    assert_eq!(f.score(f.player(1)).await, 0);
}

#[tokio::test(start_paused = true)]
async fn rtt_compensation_decides_the_race() {
    let f = Fixture::new(&[QuestionType::Normal], &[0, 0]);
    f.broadcaster.set_rtt(f.player(0), Duration::from_millis(10));
    f.broadcaster.set_rtt(f.player(1), Duration::from_millis(200));
    f.to_question_select().await;
    f.select("q1").await.unwrap();
    f.timeout().await;

    f.act(f.player(0), ClientAction::PressButton).await.unwrap();
    tokio::time::advance(Duration::from_millis(20)).await;
    f.act(f.player(1), ClientAction::PressButton).await.unwrap();
    f.close_button_window().await;

    let state = f.manager.state.read().await;
    assert_eq!(state.session.active_player, Some(f.player(1)));
    let pressed = &f.broadcaster.payloads("BUTTON_PRESSED")[0];
    assert_eq!(pressed["presses"].as_array().unwrap().len(), 2);
    assert_eq!(pressed["presses"][0]["user_id"], f.player(1).to_string());
}

#[tokio::test(start_paused = true)]
async fn buzzer_timeout_with_press_goes_to_judging_and_penalizes() {
    let f = Fixture::new(&[QuestionType::Normal, QuestionType::Normal], &[300]);
    f.to_question_select().await;
    f.select("q1").await.unwrap();
    f.timeout().await;
    f.act(f.player(0), ClientAction::PressButton).await.unwrap();

    // the buzzer deadline fires before the collection window closes
    f.timeout().await;
    assert_eq!(f.status().await, GameStatus::AnswerJudging);
    assert_eq!(
        f.manager.state.read().await.session.active_player,
        Some(f.player(0))
    );

    f.timeout().await;
    assert_eq!(f.score(f.player(0)).await, 200);
    assert_eq!(f.status().await, GameStatus::QuestionSelect);
    let result = f.broadcaster.payloads("ANSWER_RESULT");
    assert_eq!(result[0]["correct"], false);
    assert_eq!(result[0]["score_delta"], -100);
}

#[tokio::test(start_paused = true)]
async fn unanswered_buzzer_skips_question() {
    let f = Fixture::new(&[QuestionType::Normal, QuestionType::Normal], &[0]);
    f.to_question_select().await;
    f.select("q2").await.unwrap();
    f.timeout().await;
    f.timeout().await;

    assert_eq!(f.status().await, GameStatus::QuestionSelect);
    assert_eq!(f.score(f.player(0)).await, 0);
    let state = f.manager.state.read().await;
    assert!(state.session.current_question.is_none());
    assert_eq!(state.session.active_player, Some(f.host));
}

#[tokio::test(start_paused = true)]
async fn question_select_timeout_picks_first_available() {
    let f = Fixture::new(&[QuestionType::Normal, QuestionType::Normal], &[0]);
    f.to_question_select().await;
    f.timeout().await;

    let state = f.manager.state.read().await;
    assert_eq!(state.session.status, GameStatus::QuestionShow);
    assert_eq!(state.session.question().map(|q| q.id.as_str()), Some("q1"));
}

#[tokio::test(start_paused = true)]
async fn stake_question_uses_bet_as_price() {
    let f = Fixture::new(&[QuestionType::Stake], &[300, 150, 150]);
    f.to_question_select().await;
    f.select("q1").await.unwrap();

    assert_eq!(f.status().await, GameStatus::StakeBetting);
    let bettor = f.player(1);
    let view = f.broadcaster.last_state(Target::AllExcept(f.host));
    assert_eq!(view["stake_info"]["user_id"], bettor.to_string());
    assert_eq!(view["stake_info"]["max_bet"], 150);
    assert!(view["current_question"].get("text").is_none());
    let host_view = f.broadcaster.last_state(Target::User(f.host));
    assert_eq!(host_view["current_question"]["text"], "question q1");

    assert!(matches!(
        f.act(
            f.player(2),
            ClientAction::PlaceStake(PlaceStakePayload {
                amount: 100,
                all_in: false
            })
        )
        .await,
        Err(ActionRejected::NotActivePlayer)
    ));
    f.act(
        bettor,
        ClientAction::PlaceStake(PlaceStakePayload {
            amount: 1_000,
            all_in: false,
        }),
    )
    .await
    .unwrap();
    assert_eq!(f.status().await, GameStatus::QuestionShow);
    assert_eq!(f.broadcaster.payloads("STAKE_PLACED")[0]["amount"], 150);

    f.timeout().await;
    assert_eq!(f.status().await, GameStatus::AnswerJudging);
    f.act(f.host, judge(bettor, true)).await.unwrap();
    assert_eq!(f.score(bettor).await, 300);

    // the pack board keeps its listed price
    let state = f.manager.state.read().await;
    assert_eq!(state.session.rounds[0].themes[0].questions[0].price, 100);
}

#[tokio::test(start_paused = true)]
async fn stake_timeout_bets_minimum() {
    let f = Fixture::new(&[QuestionType::Stake, QuestionType::Normal], &[0]);
    f.to_question_select().await;
    f.select("q1").await.unwrap();
    f.timeout().await;

    assert_eq!(f.status().await, GameStatus::QuestionShow);
    let state = f.manager.state.read().await;
    assert_eq!(state.stake.map(|stake| stake.current_bet), Some(100));
    assert_eq!(state.session.current_question.map(|q| q.price), Some(100));
}

#[tokio::test(start_paused = true)]
async fn stake_without_bettor_continues() {
    let f = Fixture::new(&[QuestionType::Stake, QuestionType::Normal], &[]);
    f.to_question_select().await;
    f.select("q1").await.unwrap();

    assert_eq!(f.status().await, GameStatus::QuestionSelect);
    assert!(f.manager.state.read().await.stake.is_none());
}

#[tokio::test(start_paused = true)]
async fn secret_question_is_handed_over_by_host() {
    let f = Fixture::new(&[QuestionType::Secret], &[0, 0]);
    f.to_question_select().await;
    f.select("q1").await.unwrap();
    assert_eq!(f.status().await, GameStatus::SecretTransfer);

    let transfer = |target_user_id| {
        ClientAction::TransferSecret(TransferSecretPayload { target_user_id })
    };
    assert!(matches!(
        f.act(f.host, transfer(f.host)).await,
        Err(ActionRejected::NotEligible(_))
    ));
    assert!(matches!(
        f.act(f.player(0), transfer(f.player(1))).await,
        Err(ActionRejected::NotHost)
    ));

    f.act(f.host, transfer(f.player(1))).await.unwrap();
    assert_eq!(f.status().await, GameStatus::QuestionShow);
    let moved = &f.broadcaster.payloads("SECRET_TRANSFERRED")[0];
    assert_eq!(moved["to_user_id"], f.player(1).to_string());
    assert_eq!(moved["from_user_id"], f.host.to_string());
    let view = f.broadcaster.last_state(Target::AllExcept(f.host));
    assert_eq!(view["secret_target"], f.player(1).to_string());
    assert_eq!(view["active_player"], f.player(1).to_string());
    assert_eq!(view["current_question"]["text"], "question q1");
    assert!(view["current_question"].get("answer").is_none());

    f.timeout().await;
    assert_eq!(f.status().await, GameStatus::AnswerJudging);
    f.timeout().await;
    assert_eq!(f.status().await, GameStatus::RoundEnd);
}

#[tokio::test(start_paused = true)]
async fn secret_timeout_transfers_to_earliest_player() {
    let f = Fixture::new(&[QuestionType::Secret], &[0, 0]);
    f.to_question_select().await;
    f.select("q1").await.unwrap();
    f.timeout().await;

    let state = f.manager.state.read().await;
    assert_eq!(state.session.status, GameStatus::QuestionShow);
    assert_eq!(state.secret_target, Some(f.player(0)));
    let moved = &f.broadcaster.payloads("SECRET_TRANSFERRED")[0];
    assert!(moved.get("from_user_id").is_none());
}

#[tokio::test(start_paused = true)]
async fn for_all_question_scores_everyone() {
    let f = Fixture::new(&[QuestionType::ForAll, QuestionType::Normal], &[0, 0, 200]);
    f.to_question_select().await;
    f.select("q1").await.unwrap();
    f.timeout().await;
    assert_eq!(f.status().await, GameStatus::ForAllAnswering);

    f.act(f.player(0), ClientAction::SubmitForAllAnswer(answer("paris")))
        .await
        .unwrap();
    f.act(f.player(1), ClientAction::SubmitForAllAnswer(answer("london")))
        .await
        .unwrap();
    assert!(matches!(
        f.act(f.player(0), ClientAction::SubmitForAllAnswer(answer("rome")))
            .await,
        Err(ActionRejected::Duplicate)
    ));
    assert!(matches!(
        f.act(f.host, ClientAction::SubmitForAllAnswer(answer("paris")))
            .await,
        Err(ActionRejected::NotEligible(_))
    ));
    let view = f.broadcaster.last_state(Target::AllExcept(f.host));
    assert_eq!(view["for_all_answered"].as_array().unwrap().len(), 2);

    // the last expected answer closes collection early
    f.act(f.player(2), ClientAction::SubmitForAllAnswer(answer(" PARIS ")))
        .await
        .unwrap();
    assert_eq!(f.status().await, GameStatus::ForAllResults);
    assert_eq!(f.score(f.player(0)).await, 100);
    assert_eq!(f.score(f.player(1)).await, 0);
    assert_eq!(f.score(f.player(2)).await, 300);

    let results = &f.broadcaster.payloads("FOR_ALL_RESULTS")[0];
    assert_eq!(results["correct_answer"], "paris");
    assert_eq!(results["results"].as_array().unwrap().len(), 3);
    let view = f.broadcaster.last_state(Target::AllExcept(f.host));
    assert_eq!(view["current_question"]["answer"], "paris");
    assert_eq!(view["for_all_results"].as_array().unwrap().len(), 3);

    f.timeout().await;
    assert_eq!(f.status().await, GameStatus::QuestionSelect);
    assert!(f.event_types().contains(&EventType::ForAllCompleted));
}

#[tokio::test(start_paused = true)]
async fn for_all_timeout_scores_collected_answers() {
    let f = Fixture::new(&[QuestionType::ForAll], &[0, 0]);
    f.to_question_select().await;
    f.select("q1").await.unwrap();
    f.timeout().await;
    f.act(f.player(0), ClientAction::SubmitForAllAnswer(answer("paris")))
        .await
        .unwrap();

    f.timeout().await;
    assert_eq!(f.status().await, GameStatus::ForAllResults);
    assert_eq!(f.score(f.player(0)).await, 100);
    assert_eq!(f.manager.state.read().await.for_all_results.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn last_round_ends_with_ranked_scoreboard() {
    let f = Fixture::new(&[QuestionType::Normal], &[300, 300, 100]);
    f.to_question_select().await;
    {
        let mut state = f.manager.state.write().await;
        f.manager.end_round(&mut state).unwrap();
        f.manager.start_round(&mut state, 2).unwrap();
    }

    assert_eq!(f.status().await, GameStatus::GameEnd);
    let complete = &f.broadcaster.payloads("GAME_COMPLETE")[0];
    let ranks: Vec<_> = complete["final_scores"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["rank"].as_u64().unwrap())
        .collect();
    assert_eq!(ranks, vec![1, 1, 3]);
    assert_eq!(complete["winners"][0]["user_id"], f.player(0).to_string());
    assert_eq!(complete["winners"][1]["user_id"], f.player(1).to_string());

    let view = f.broadcaster.last_state(Target::AllExcept(f.host));
    assert_eq!(view["final_scores"].as_array().unwrap().len(), 3);
    assert!(f.event_types().contains(&EventType::GameFinished));
    assert!(f.manager.state.read().await.session.finished_at.is_some());

    assert!(f.manager.is_stopped());
    assert_eq!(*f.broadcaster.released.lock().unwrap(), vec![f.manager.game_id()]);
}

#[tokio::test(start_paused = true)]
async fn stale_delayed_transition_is_ignored() {
    let f = Fixture::new(&[QuestionType::Normal, QuestionType::Normal], &[0]);
    f.to_question_select().await;
    let mut state = f.manager.state.write().await;
    let stale = Scheduled {
        status: state.session.status,
        round: state.session.current_round,
        epoch: state.epoch,
        kind: ScheduledKind::NextRound,
    };
    f.manager.select_question(&mut state, 0, 0).unwrap();
    f.manager.handle_timeout(&mut state);

    f.manager.dispatch(&mut state, Command::Scheduled(stale));
    assert_eq!(state.session.status, GameStatus::ButtonPress);
    assert_eq!(state.session.current_round, 1);
}

#[tokio::test(start_paused = true)]
async fn connectivity_changes_are_broadcast() {
    let f = Fixture::new(&[QuestionType::Normal], &[0]);
    {
        let mut state = f.manager.state.write().await;
        f.manager.apply_connectivity(&mut state, f.player(0), true);
        f.manager.apply_connectivity(&mut state, Uuid::new_v4(), true);
        assert!(state.session.players[&f.player(0)].is_connected);
        f.manager.apply_connectivity(&mut state, f.player(0), false);
    }

    let types = f.event_types();
    assert_eq!(
        types,
        vec![EventType::PlayerConnected, EventType::PlayerDisconnected]
    );
    let view = f.broadcaster.last_state(Target::AllExcept(f.host));
    assert_eq!(view["players"][1]["is_connected"], false);
    assert_eq!(view["status"], "waiting");
}

#[tokio::test(start_paused = true)]
async fn round_media_is_announced_and_tracked() {
    let mut pack = sample_pack(&[QuestionType::Normal, QuestionType::Normal]);
    let question = &mut pack.rounds[0].themes[0].questions[0];
    question.media_type = "audio".into();
    question.media_url = "http://cdn/q1.mp3".into();
    question.media_duration_ms = 4_000;
    let f = Fixture::with_pack(pack, &[0]);
    f.to_question_select().await;

    let manifest = &f.broadcaster.payloads("ROUND_MEDIA_MANIFEST")[0];
    assert_eq!(manifest["round"], 1);
    assert_eq!(manifest["total_count"], 1);

    assert!(matches!(
        f.act(
            f.player(0),
            ClientAction::MediaLoadComplete(MediaLoadCompletePayload {
                round: Some(3),
                loaded_count: 1
            })
        )
        .await,
        Err(ActionRejected::StaleRound { reported: 3, current: 1 })
    ));
    for user_id in [f.host, f.player(0)] {
        f.act(
            user_id,
            ClientAction::MediaLoadComplete(MediaLoadCompletePayload {
                round: Some(1),
                loaded_count: 1,
            }),
        )
        .await
        .unwrap();
    }

    // a spectator reporting progress does not hold the round back
    let spectator = Uuid::new_v4();
    f.act(
        spectator,
        ClientAction::MediaLoadProgress(MediaLoadProgressPayload {
            loaded: 0,
            total: 1,
            bytes_loaded: 0,
            percent: 0,
        }),
    )
    .await
    .unwrap();
    assert!(matches!(
        f.act(
            spectator,
            ClientAction::MediaLoadComplete(MediaLoadCompletePayload {
                round: Some(1),
                loaded_count: 1,
            })
        )
        .await,
        Err(ActionRejected::UnknownPlayer(_))
    ));
    assert!(f.manager.state.read().await.media.all_clients_ready());

    f.select("q1").await.unwrap();
    let start = &f.broadcaster.payloads("START_MEDIA")[0];
    assert_eq!(start["url"], "http://cdn/q1.mp3");
    assert_eq!(start["duration_ms"], 4_000);
    // read time covers playback
    assert_eq!(f.manager.timer.remaining_secs(), 7);
}

#[tokio::test(start_paused = true)]
async fn cancel_is_terminal_and_stops_manager() {
    let f = Fixture::new(&[QuestionType::Normal], &[0]);
    f.to_question_select().await;

    f.manager.cancel().await.unwrap();
    assert_eq!(f.status().await, GameStatus::Cancelled);
    assert!(f.manager.is_stopped());
    assert_eq!(*f.broadcaster.released.lock().unwrap(), vec![f.manager.game_id()]);
    assert!(matches!(
        f.manager.cancel().await,
        Err(ActionRejected::Transition(_))
    ));
    assert!(f.event_types().contains(&EventType::GameCancelled));
}

#[tokio::test(start_paused = true)]
async fn control_loop_drives_session_to_the_end() {
    let f = Fixture::new(&[QuestionType::Normal], &[0]);
    f.manager.start().await;
    assert_eq!(f.status().await, GameStatus::RoundsOverview);

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    assert_eq!(f.status().await, GameStatus::RoundStart);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(f.status().await, GameStatus::QuestionSelect);

    f.manager
        .handle_client_message(
            f.host,
            ClientAction::SelectQuestion(SelectQuestionPayload {
                theme_id: "Geography".into(),
                question_id: "q1".into(),
            }),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(f.status().await, GameStatus::QuestionShow);

    f.manager
        .set_player_connected(f.player(0), true)
        .await;
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(f.status().await, GameStatus::ButtonPress);

    f.manager
        .handle_client_message(f.player(0), ClientAction::PressButton)
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(f.status().await, GameStatus::Answering);

    f.manager
        .handle_client_message(
            f.player(0),
            ClientAction::SubmitAnswer(answer("paris")),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(f.status().await, GameStatus::AnswerJudging);

    // nobody judges: the active player is penalized, the round closes, the game ends
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(f.status().await, GameStatus::GameEnd);
    assert_eq!(f.score(f.player(0)).await, 0);
    assert!(
        f.manager.state.read().await.session.players[&f.player(0)].is_connected
    );

    f.manager.stop();
    f.manager.stop();
    assert!(f.manager.is_stopped());
}
