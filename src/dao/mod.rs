/// Audit trail of session events.
pub mod event_log;
/// Session persistence and cache.
pub mod game_store;
/// Database model definitions.
pub mod models;
/// Question pack provider and cache.
pub mod pack_store;
/// Storage abstraction layer shared by every backend.
pub mod storage;
