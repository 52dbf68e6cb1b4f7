/// In-memory backend used when no external store is configured.
pub mod memory;

use crate::dao::models::GameEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use self::memory::MemoryGameStore;

/// Durable storage of session records.
pub trait GameRepository: Send + Sync {
    /// Store a new session record.
    fn create_game_session(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Overwrite an existing session record.
    fn update_game_session(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Session record by id.
    fn get_game_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    /// Unfinished session the user takes part in, if any.
    fn get_active_game_for_user(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
}

/// Fast, expiring copy of the live session state.
pub trait GameCache: Send + Sync {
    /// Cache the latest session state.
    fn save_game_state(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Cached session state, unless expired.
    fn load_game_state(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    /// Drop the cached session state.
    fn delete_game_state(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
}
