use futures::future::{BoxFuture, FutureExt};
use tracing::info;

use crate::{dao::storage::StorageResult, state::event::GameEvent};

/// Append-only audit trail of session events.
pub trait EventLogger: Send + Sync {
    /// Record one event. Callers treat failures as best effort.
    fn log_event(&self, event: GameEvent) -> BoxFuture<'static, StorageResult<()>>;
}

/// Writes every event to the tracing output. Nothing is retained.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLogger;

impl TracingEventLogger {
    /// Create a logger.
    pub fn new() -> Self {
        Self
    }
}

impl EventLogger for TracingEventLogger {
    fn log_event(&self, event: GameEvent) -> BoxFuture<'static, StorageResult<()>> {
        info!(
            game_id = %event.game_id,
            event_type = ?event.event_type,
            user_id = ?event.user_id,
            round = ?event.round,
            question_id = ?event.question_id,
            "game event"
        );
        async { Ok(()) }.boxed()
    }
}

/// Keeps every event in memory per session, for assertions in tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct RecordingEventLogger {
    events: std::sync::Arc<dashmap::DashMap<uuid::Uuid, Vec<GameEvent>>>,
}

#[cfg(test)]
impl RecordingEventLogger {
    /// Events recorded for a session, in emission order.
    pub(crate) fn events_for(&self, game_id: uuid::Uuid) -> Vec<GameEvent> {
        self.events
            .get(&game_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl EventLogger for RecordingEventLogger {
    fn log_event(&self, event: GameEvent) -> BoxFuture<'static, StorageResult<()>> {
        self.events.entry(event.game_id).or_default().push(event);
        async { Ok(()) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::event::EventType;

    #[tokio::test]
    async fn tracing_logger_accepts_events() {
        let logger = TracingEventLogger::new();
        logger
            .log_event(GameEvent::new(Uuid::new_v4(), EventType::GameStarted))
            .await
            .unwrap();
        assert_eq!(std::mem::size_of_val(&logger), 0);
    }

    #[tokio::test]
    async fn recorded_events_are_grouped_by_game() {
        let logger = RecordingEventLogger::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        logger
            .log_event(GameEvent::new(a, EventType::GameStarted))
            .await
            .unwrap();
        logger
            .log_event(GameEvent::new(a, EventType::RoundStarted).with_round(1))
            .await
            .unwrap();
        logger
            .log_event(GameEvent::new(b, EventType::GameStarted))
            .await
            .unwrap();

        let types: Vec<_> = logger.events_for(a).iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::GameStarted, EventType::RoundStarted]);
        assert_eq!(logger.events_for(b).len(), 1);
    }
}
