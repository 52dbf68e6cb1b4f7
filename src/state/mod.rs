/// Buzzer race arbitration.
pub mod buzzer;
/// Audit events.
pub mod event;
/// Simultaneous answer collection.
pub mod for_all;
/// Session, players and settings.
pub mod game;
/// Round media preloading.
pub mod media;
/// Question pack content.
pub mod pack;
/// Session phases and legal transitions.
pub mod state_machine;
/// Phase countdown.
pub mod timer;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    dao::{
        event_log::{EventLogger, TracingEventLogger},
        game_store::{GameCache, GameRepository, MemoryGameStore},
        pack_store::{FilePackService, MemoryPackCache, PackCache, PackService},
    },
    services::{hub::Hub, manager::ManagerDeps},
};

/// Handle to the application state shared across handlers and tasks.
pub type SharedState = Arc<AppState>;

/// Collaborators backing the session engine.
#[derive(Clone)]
pub struct Stores {
    /// Durable session records.
    pub repository: Arc<dyn GameRepository>,
    /// Expiring copy of live session state.
    pub cache: Arc<dyn GameCache>,
    /// Audit trail.
    pub events: Arc<dyn EventLogger>,
    /// Question pack provider.
    pub packs: Arc<dyn PackService>,
    /// Cache in front of `packs`.
    pub pack_cache: Arc<dyn PackCache>,
}

impl Stores {
    /// Process-local stores, with packs read from `config.packs_dir`.
    pub fn local(config: &AppConfig) -> Self {
        let games = MemoryGameStore::new(config.cache_ttl);
        Self {
            repository: Arc::new(games.clone()),
            cache: Arc::new(games),
            events: Arc::new(TracingEventLogger::new()),
            packs: Arc::new(FilePackService::new(config.packs_dir.clone())),
            pack_cache: Arc::new(MemoryPackCache::new()),
        }
    }
}

/// Central application state: the session hub, configuration and storage handles.
pub struct AppState {
    hub: Arc<Hub>,
    config: Arc<AppConfig>,
    stores: Stores,
}

impl AppState {
    /// Construct a new [`AppState`] backed by process-local stores.
    pub fn new(config: AppConfig) -> SharedState {
        let stores = Stores::local(&config);
        Self::with_stores(config, stores)
    }

    /// Construct a new [`AppState`] over the given collaborators.
    pub fn with_stores(config: AppConfig, stores: Stores) -> SharedState {
        Arc::new(Self {
            hub: Hub::new(),
            config: Arc::new(config),
            stores,
        })
    }

    /// Registry of live sessions and their sockets.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Shared configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// Storage collaborators.
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Dependencies handed to every new session manager.
    pub fn manager_deps(&self) -> ManagerDeps {
        ManagerDeps {
            broadcaster: self.hub.clone(),
            events: Arc::clone(&self.stores.events),
            repository: Arc::clone(&self.stores.repository),
            cache: Arc::clone(&self.stores.cache),
        }
    }
}
