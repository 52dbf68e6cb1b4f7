use std::{io::ErrorKind, path::PathBuf};

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::{
        pack_store::PackService,
        storage::{StorageError, StorageResult},
    },
    state::pack::Pack,
};

/// Serves packs from `<dir>/<pack_id>.json`.
#[derive(Debug, Clone)]
pub struct FilePackService {
    dir: PathBuf,
}

impl FilePackService {
    /// Serve packs found under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn pack_path(&self, pack_id: Uuid) -> PathBuf {
        self.dir.join(format!("{pack_id}.json"))
    }
}

impl PackService for FilePackService {
    fn get_pack_content(&self, pack_id: Uuid) -> BoxFuture<'static, StorageResult<Option<Pack>>> {
        let path = self.pack_path(pack_id);
        async move {
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "pack file not found");
                    return Ok(None);
                }
                Err(err) => {
                    return Err(StorageError::unavailable(
                        format!("failed to read pack file {}", path.display()),
                        err,
                    ));
                }
            };

            let pack = serde_json::from_str::<Pack>(&contents).map_err(|err| {
                StorageError::unavailable(
                    format!("failed to parse pack file {}", path.display()),
                    err,
                )
            })?;
            Ok(Some(pack))
        }
        .boxed()
    }
}
