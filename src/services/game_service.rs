use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::GameEntity,
    dto::game::{ActiveGameResponse, CreateGameRequest, CreateGameResponse, GameSummary},
    error::ServiceError,
    services::manager::GameManager,
    state::{
        SharedState,
        game::{Player, Session, Settings},
        pack::Pack,
    },
};

/// Build a session from a lobby roster, persist it and start its manager.
pub async fn create_game(
    state: &SharedState,
    request: CreateGameRequest,
) -> Result<CreateGameResponse, ServiceError> {
    let CreateGameRequest {
        room_id,
        pack_id,
        players,
        settings,
    } = request;

    let pack = load_pack(state, pack_id).await?;
    let settings = settings
        .map(Settings::from)
        .unwrap_or(state.config().default_settings);
    if !settings.is_valid() {
        return Err(ServiceError::InvalidInput(
            "time limits must lie within 1..=300 seconds".into(),
        ));
    }

    let mut session = Session::new(room_id, pack.id, settings, pack.rounds);
    for player in players {
        session
            .add_player(Player::new(
                player.user_id,
                player.username,
                player.avatar_url,
                player.role,
            ))
            .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    }
    if session.host_id().is_none() {
        return Err(ServiceError::InvalidInput("a session requires a host".into()));
    }

    let game_id = session.id;
    let entity = GameEntity::from(&session);
    let stores = state.stores();
    stores.repository.create_game_session(entity.clone()).await?;
    if let Err(err) = stores.cache.save_game_state(entity).await {
        warn!(%game_id, error = %err, "failed to cache new game state");
    }

    let manager = GameManager::new(session, state.manager_deps());
    state.hub().register_game_manager(game_id, manager.clone());
    manager.start().await;

    info!(%game_id, %room_id, %pack_id, "game created");
    Ok(CreateGameResponse {
        game_id,
        websocket_url: format!("/games/{game_id}/ws"),
        status: "created".into(),
    })
}

/// Live snapshot of a session, falling back to the cache then the repository.
pub async fn get_game(state: &SharedState, id: Uuid) -> Result<GameSummary, ServiceError> {
    if let Some(manager) = state.hub().manager(id) {
        return Ok(manager.entity().await.into());
    }

    let stores = state.stores();
    match stores.cache.load_game_state(id).await {
        Ok(Some(entity)) => return Ok(entity.into()),
        Ok(None) => {}
        Err(err) => warn!(game_id = %id, error = %err, "game cache lookup failed"),
    }

    stores
        .repository
        .get_game_session(id)
        .await?
        .map(GameSummary::from)
        .ok_or_else(|| ServiceError::NotFound(format!("game `{id}` not found")))
}

/// Running session the user takes part in, if any.
pub async fn active_game_for_user(
    state: &SharedState,
    user_id: Uuid,
) -> Result<ActiveGameResponse, ServiceError> {
    let game = state
        .stores()
        .repository
        .get_active_game_for_user(user_id)
        .await?
        .map(GameSummary::from);

    Ok(ActiveGameResponse {
        has_active_game: game.is_some(),
        game,
    })
}

/// Abort a live session. The manager releases itself from the hub.
pub async fn cancel_game(state: &SharedState, id: Uuid) -> Result<GameSummary, ServiceError> {
    let Some(manager) = state.hub().manager(id) else {
        return Err(ServiceError::NotFound(format!("game `{id}` is not running")));
    };

    manager.cancel().await?;
    Ok(manager.entity().await.into())
}

/// Read a pack through the cache, filling it on a miss.
async fn load_pack(state: &SharedState, pack_id: Uuid) -> Result<Pack, ServiceError> {
    let stores = state.stores();
    match stores.pack_cache.get_pack(pack_id).await {
        Ok(Some(pack)) => return Ok(pack),
        Ok(None) => {}
        Err(err) => warn!(%pack_id, error = %err, "pack cache lookup failed"),
    }

    let pack = stores
        .packs
        .get_pack_content(pack_id)
        .await?
        .ok_or(ServiceError::PackNotFound(pack_id))?;
    if let Err(err) = stores.pack_cache.put_pack(pack.clone()).await {
        warn!(%pack_id, error = %err, "failed to cache pack");
    }
    Ok(pack)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::{BoxFuture, FutureExt};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            event_log::TracingEventLogger,
            game_store::MemoryGameStore,
            pack_store::{MemoryPackCache, PackCache, PackService},
            storage::StorageResult,
        },
        dto::game::{PlayerInput, SettingsInput},
        state::{
            AppState, Stores,
            game::Role,
            pack::{QuestionType, tests::sample_pack},
            state_machine::GameStatus,
        },
    };

    struct StaticPacks(Pack);

    impl PackService for StaticPacks {
        fn get_pack_content(
            &self,
            pack_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<Pack>>> {
            let pack = (pack_id == self.0.id).then(|| self.0.clone());
            async move { Ok(pack) }.boxed()
        }
    }

    struct Fixture {
        state: SharedState,
        pack_id: Uuid,
        pack_cache: MemoryPackCache,
    }

    fn fixture() -> Fixture {
        let pack = sample_pack(&[QuestionType::Normal, QuestionType::Normal]);
        let pack_id = pack.id;
        let games = MemoryGameStore::new(std::time::Duration::from_secs(60));
        let pack_cache = MemoryPackCache::new();
        let stores = Stores {
            repository: Arc::new(games.clone()),
            cache: Arc::new(games),
            events: Arc::new(TracingEventLogger::new()),
            packs: Arc::new(StaticPacks(pack)),
            pack_cache: Arc::new(pack_cache.clone()),
        };
        Fixture {
            state: AppState::with_stores(AppConfig::default(), stores),
            pack_id,
            pack_cache,
        }
    }

    fn request(pack_id: Uuid, host: Uuid, player: Uuid) -> CreateGameRequest {
        CreateGameRequest {
            room_id: Uuid::new_v4(),
            pack_id,
            players: vec![
                PlayerInput {
                    user_id: host,
                    username: "host".into(),
                    avatar_url: None,
                    role: Role::Host,
                },
                PlayerInput {
                    user_id: player,
                    username: "alice".into(),
                    avatar_url: None,
                    role: Role::Player,
                },
            ],
            settings: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn created_game_is_live_and_persisted() {
        let f = fixture();
        let (host, player) = (Uuid::new_v4(), Uuid::new_v4());

        let created = create_game(&f.state, request(f.pack_id, host, player))
            .await
            .unwrap();
        assert_eq!(created.status, "created");
        assert_eq!(created.websocket_url, format!("/games/{}/ws", created.game_id));
        assert_eq!(f.state.hub().session_count(), 1);

        let summary = get_game(&f.state, created.game_id).await.unwrap();
        assert_eq!(summary.status, GameStatus::RoundsOverview);
        assert_eq!(summary.players.len(), 2);
        assert_eq!(summary.settings, Settings::default());

        let active = active_game_for_user(&f.state, player).await.unwrap();
        assert!(active.has_active_game);
        assert_eq!(active.game.map(|game| game.game_id), Some(created.game_id));
        assert!(
            !active_game_for_user(&f.state, Uuid::new_v4())
                .await
                .unwrap()
                .has_active_game
        );

        // the pack was cached on first use
        assert!(f.pack_cache.get_pack(f.pack_id).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_settings_are_kept() {
        let f = fixture();
        let mut req = request(f.pack_id, Uuid::new_v4(), Uuid::new_v4());
        req.settings = Some(SettingsInput {
            time_for_answer: 10,
            time_for_choice: 15,
        });

        let created = create_game(&f.state, req).await.unwrap();
        let summary = get_game(&f.state, created.game_id).await.unwrap();
        assert_eq!(summary.settings.time_for_answer, 10);
        assert_eq!(summary.settings.time_for_choice, 15);
    }

    #[tokio::test]
    async fn unknown_pack_is_rejected() {
        let f = fixture();
        let missing = Uuid::new_v4();
        let err = create_game(&f.state, request(missing, Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PackNotFound(id) if id == missing));
        assert_eq!(f.state.hub().session_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_roster_entry_is_rejected() {
        let f = fixture();
        let host = Uuid::new_v4();
        let err = create_game(&f.state, request(f.pack_id, host, host))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unknown_game_is_not_found() {
        let f = fixture();
        assert!(matches!(
            get_game(&f.state, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            cancel_game(&f.state, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_game_leaves_the_hub() {
        let f = fixture();
        let created = create_game(&f.state, request(f.pack_id, Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        let summary = cancel_game(&f.state, created.game_id).await.unwrap();
        assert_eq!(summary.status, GameStatus::Cancelled);
        assert!(summary.finished_at.is_some());
        assert_eq!(f.state.hub().session_count(), 0);
        assert!(matches!(
            cancel_game(&f.state, created.game_id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
