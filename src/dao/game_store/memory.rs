use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use tokio::time::Instant;
use uuid::Uuid;

use crate::dao::{
    game_store::{GameCache, GameRepository},
    models::GameEntity,
    storage::{StorageError, StorageResult},
};

struct CachedGame {
    entity: GameEntity,
    stored_at: Instant,
}

/// Process-local game storage backed by [`DashMap`].
///
/// Acts both as the repository (records never expire) and as the cache (records expire
/// after the configured TTL and are dropped lazily on read).
#[derive(Clone)]
pub struct MemoryGameStore {
    games: Arc<DashMap<Uuid, GameEntity>>,
    cache: Arc<DashMap<Uuid, CachedGame>>,
    cache_ttl: Duration,
}

impl MemoryGameStore {
    /// Create an empty store whose cached entries live for `cache_ttl`.
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            games: Arc::new(DashMap::new()),
            cache: Arc::new(DashMap::new()),
            cache_ttl,
        }
    }

    /// Number of stored session records.
    pub fn len(&self) -> usize {
        self.games.len()
    }

    /// Whether no session record is stored.
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

impl GameRepository for MemoryGameStore {
    fn create_game_session(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.games.insert(game.id, game);
        async { Ok(()) }.boxed()
    }

    fn update_game_session(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = match self.games.get_mut(&game.id) {
            Some(mut entry) => {
                *entry = game;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("game `{}`", game.id))),
        };
        async move { result }.boxed()
    }

    fn get_game_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let game = self.games.get(&id).map(|entry| entry.value().clone());
        async move { Ok(game) }.boxed()
    }

    fn get_active_game_for_user(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let game = self
            .games
            .iter()
            .filter(|entry| entry.is_active() && entry.has_player(user_id))
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.value().clone());
        async move { Ok(game) }.boxed()
    }
}

impl GameCache for MemoryGameStore {
    fn save_game_state(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.cache.insert(
            game.id,
            CachedGame {
                entity: game,
                stored_at: Instant::now(),
            },
        );
        async { Ok(()) }.boxed()
    }

    fn load_game_state(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let ttl = self.cache_ttl;
        let expired = self
            .cache
            .get(&id)
            .is_some_and(|entry| entry.stored_at.elapsed() > ttl);
        if expired {
            self.cache.remove(&id);
        }
        let game = self.cache.get(&id).map(|entry| entry.entity.clone());
        async move { Ok(game) }.boxed()
    }

    fn delete_game_state(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        self.cache.remove(&id);
        async { Ok(()) }.boxed()
    }
}
