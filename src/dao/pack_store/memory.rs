use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use uuid::Uuid;

use crate::{
    dao::{pack_store::PackCache, storage::StorageResult},
    state::pack::Pack,
};

/// Process-local pack cache.
#[derive(Clone, Default)]
pub struct MemoryPackCache {
    packs: Arc<DashMap<Uuid, Pack>>,
}

impl MemoryPackCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PackCache for MemoryPackCache {
    fn get_pack(&self, pack_id: Uuid) -> BoxFuture<'static, StorageResult<Option<Pack>>> {
        let pack = self.packs.get(&pack_id).map(|entry| entry.value().clone());
        async move { Ok(pack) }.boxed()
    }

    fn put_pack(&self, pack: Pack) -> BoxFuture<'static, StorageResult<()>> {
        self.packs.insert(pack.id, pack);
        async { Ok(()) }.boxed()
    }
}
