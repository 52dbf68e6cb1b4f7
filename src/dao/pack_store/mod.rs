/// Packs stored as JSON files on disk.
pub mod file;
/// In-memory pack cache.
pub mod memory;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{dao::storage::StorageResult, state::pack::Pack};

pub use self::{file::FilePackService, memory::MemoryPackCache};

/// Provider of question pack content.
pub trait PackService: Send + Sync {
    /// Load a pack, `None` when it does not exist.
    fn get_pack_content(&self, pack_id: Uuid) -> BoxFuture<'static, StorageResult<Option<Pack>>>;
}

/// Read-through cache in front of a [`PackService`].
pub trait PackCache: Send + Sync {
    /// Cached pack, if present.
    fn get_pack(&self, pack_id: Uuid) -> BoxFuture<'static, StorageResult<Option<Pack>>>;
    /// Cache a pack.
    fn put_pack(&self, pack: Pack) -> BoxFuture<'static, StorageResult<()>>;
}
