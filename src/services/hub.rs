//! Registry of session managers and of the sockets attached to each session.

use std::{sync::Arc, time::Duration};

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientAction, ServerMessage},
    services::{manager::GameManager, rtt::RttTracker},
};

/// Fan-out surface the session manager uses to reach its sockets.
///
/// Delivery is fire-and-forget: a socket that cannot keep up is dropped by the
/// implementation rather than slowing the caller down.
pub trait SessionBroadcaster: Send + Sync {
    /// Deliver `payload` to every socket of the session.
    fn broadcast(&self, game_id: Uuid, payload: &str);
    /// Deliver `payload` to every socket of the session not owned by `excluded_user`.
    fn broadcast_except(&self, game_id: Uuid, excluded_user: Uuid, payload: &str);
    /// Deliver `payload` to every socket of `user_id` in the session.
    fn send_to_user(&self, game_id: Uuid, user_id: Uuid, payload: &str);
    /// Smoothed round trip time of the freshest socket of `user_id`, zero if unknown.
    fn client_rtt(&self, game_id: Uuid, user_id: Uuid) -> Duration;
    /// The session reached a terminal phase: forget its manager and close its sockets.
    fn release_session(&self, game_id: Uuid);
}

/// Why a frame could not be queued for a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The outbound buffer is full.
    #[error("client send buffer full")]
    Full,
    /// The socket writer is gone.
    #[error("client disconnected")]
    Closed,
}

/// Hub-side handle of one socket.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Connection identifier, unique per socket.
    pub id: Uuid,
    /// Session the socket is attached to.
    pub game_id: Uuid,
    /// Account owning the socket.
    pub user_id: Uuid,
    tx: mpsc::Sender<Message>,
    rtt: Arc<RttTracker>,
    kicked: Arc<Notify>,
}

impl ClientHandle {
    /// Wrap the outbound channel of a fresh socket.
    pub fn new(game_id: Uuid, user_id: Uuid, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            user_id,
            tx,
            rtt: Arc::new(RttTracker::new()),
            kicked: Arc::new(Notify::new()),
        }
    }

    /// Queue a text frame without waiting.
    pub fn try_send_text(&self, payload: &str) -> Result<(), DeliveryError> {
        self.tx
            .try_send(Message::Text(Utf8Bytes::from(payload)))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    /// Serialize and queue a server message. Serialization failures are logged and dropped.
    pub fn send_message(&self, message: &ServerMessage) -> Result<(), DeliveryError> {
        match serde_json::to_string(message) {
            Ok(payload) => self.try_send_text(&payload),
            Err(err) => {
                warn!(kind = message.kind(), error = %err, "failed to serialize server message");
                Ok(())
            }
        }
    }

    /// Round trip tracker of the socket.
    pub fn rtt(&self) -> &RttTracker {
        &self.rtt
    }

    /// Ask the socket task to terminate.
    pub fn kick(&self) {
        self.kicked.notify_one();
    }

    /// Resolve once the hub kicked this socket.
    pub async fn kicked(&self) {
        self.kicked.notified().await;
    }
}

/// Process-wide registry routing frames between sockets and session managers.
#[derive(Default)]
pub struct Hub {
    clients: DashMap<Uuid, IndexMap<Uuid, ClientHandle>>,
    managers: DashMap<Uuid, Arc<GameManager>>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make a running session reachable from sockets.
    pub fn register_game_manager(&self, game_id: Uuid, manager: Arc<GameManager>) {
        self.managers.insert(game_id, manager);
        info!(%game_id, "session manager registered");
    }

    /// Forget a session manager and stop it.
    pub fn unregister_game_manager(&self, game_id: Uuid) -> Option<Arc<GameManager>> {
        let (_, manager) = self.managers.remove(&game_id)?;
        manager.stop();
        info!(%game_id, "session manager unregistered");
        Some(manager)
    }

    /// Manager of a running session.
    pub fn manager(&self, game_id: Uuid) -> Option<Arc<GameManager>> {
        self.managers
            .get(&game_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered session managers.
    pub fn session_count(&self) -> usize {
        self.managers.len()
    }

    /// Number of attached sockets across all sessions.
    pub fn client_count(&self) -> usize {
        self.clients.iter().map(|entry| entry.value().len()).sum()
    }

    /// Stop every session manager and kick every socket. Returns the number of stopped sessions.
    pub fn shutdown(&self) -> usize {
        let game_ids: Vec<Uuid> = self.managers.iter().map(|entry| *entry.key()).collect();
        let stopped = game_ids
            .into_iter()
            .filter_map(|game_id| self.unregister_game_manager(game_id))
            .count();
        for sockets in self.clients.iter() {
            sockets.values().for_each(ClientHandle::kick);
        }
        self.clients.clear();
        stopped
    }

    /// Attach a socket, mark its owner connected and send it the current snapshot.
    ///
    /// Sockets of unknown sessions receive a `GAME_NOT_FOUND` error and are not attached.
    pub async fn register(&self, client: ClientHandle) -> bool {
        let Some(manager) = self.manager(client.game_id) else {
            let _ = client.send_message(&ServerMessage::game_not_found());
            return false;
        };

        self.clients
            .entry(client.game_id)
            .or_default()
            .insert(client.id, client.clone());
        debug!(game_id = %client.game_id, user_id = %client.user_id, conn_id = %client.id, "client registered");

        manager.set_player_connected(client.user_id, true).await;
        manager.send_state_to_client(&client).await;
        true
    }

    /// Detach a socket. The owner is marked disconnected once their last socket is gone.
    pub async fn unregister(&self, client: &ClientHandle) {
        let still_connected = self.detach(client.game_id, client.id, client.user_id);
        debug!(game_id = %client.game_id, user_id = %client.user_id, conn_id = %client.id, "client unregistered");

        if still_connected {
            return;
        }
        if let Some(manager) = self.manager(client.game_id) {
            manager.set_player_connected(client.user_id, false).await;
        }
    }

    /// Forward a decoded action to the session manager.
    pub async fn handle_message(&self, client: &ClientHandle, action: ClientAction) {
        match self.manager(client.game_id) {
            Some(manager) => manager.handle_client_message(client.user_id, action).await,
            None => {
                let _ = client.send_message(&ServerMessage::game_not_found());
            }
        }
    }

    /// Remove a socket and report whether its owner still has another one attached.
    fn detach(&self, game_id: Uuid, conn_id: Uuid, user_id: Uuid) -> bool {
        let Some(mut sockets) = self.clients.get_mut(&game_id) else {
            return false;
        };
        sockets.shift_remove(&conn_id);
        let still_connected = sockets.values().any(|other| other.user_id == user_id);
        let empty = sockets.is_empty();
        drop(sockets);

        if empty {
            self.clients.remove_if(&game_id, |_, sockets| sockets.is_empty());
        }
        still_connected
    }

    fn deliver<F>(&self, game_id: Uuid, payload: &str, include: F)
    where
        F: Fn(&ClientHandle) -> bool,
    {
        let targets: Vec<ClientHandle> = match self.clients.get(&game_id) {
            Some(sockets) => sockets
                .values()
                .filter(|client| include(client))
                .cloned()
                .collect(),
            None => return,
        };

        for client in targets {
            if let Err(err) = client.try_send_text(payload) {
                warn!(%game_id, user_id = %client.user_id, conn_id = %client.id, error = %err, "dropping slow client");
                self.detach(game_id, client.id, client.user_id);
                client.kick();
            }
        }
    }
}

impl SessionBroadcaster for Hub {
    fn broadcast(&self, game_id: Uuid, payload: &str) {
        self.deliver(game_id, payload, |_| true);
    }

    fn broadcast_except(&self, game_id: Uuid, excluded_user: Uuid, payload: &str) {
        self.deliver(game_id, payload, |client| client.user_id != excluded_user);
    }

    fn send_to_user(&self, game_id: Uuid, user_id: Uuid, payload: &str) {
        self.deliver(game_id, payload, |client| client.user_id == user_id);
    }

    fn client_rtt(&self, game_id: Uuid, user_id: Uuid) -> Duration {
        self.clients
            .get(&game_id)
            .and_then(|sockets| {
                sockets
                    .values()
                    .rev()
                    .find(|client| client.user_id == user_id)
                    .map(|client| client.rtt().smoothed())
            })
            .unwrap_or_default()
    }

    fn release_session(&self, game_id: Uuid) {
        self.unregister_game_manager(game_id);
        if let Some((_, sockets)) = self.clients.remove(&game_id) {
            debug!(%game_id, sockets = sockets.len(), "closing sockets of finished session");
            sockets.values().for_each(ClientHandle::kick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attach(hub: &Hub, game_id: Uuid, user_id: Uuid, capacity: usize) -> (ClientHandle, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client = ClientHandle::new(game_id, user_id, tx);
        hub.clients
            .entry(game_id)
            .or_default()
            .insert(client.id, client.clone());
        (client, rx)
    }

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_respects_audience() {
        let hub = Hub::default();
        let game_id = Uuid::new_v4();
        let (host, other) = (Uuid::new_v4(), Uuid::new_v4());
        let (_h, mut host_rx) = attach(&hub, game_id, host, 8);
        let (_p, mut player_rx) = attach(&hub, game_id, other, 8);

        hub.broadcast_except(game_id, host, "players");
        hub.send_to_user(game_id, host, "host");
        hub.broadcast(Uuid::new_v4(), "elsewhere");

        assert_eq!(text(host_rx.recv().await.unwrap()), "host");
        assert_eq!(text(player_rx.recv().await.unwrap()), "players");
        assert!(host_rx.try_recv().is_err());
        assert!(player_rx.try_recv().is_err());
        assert_eq!(hub.client_count(), 2);
    }

    #[tokio::test]
    async fn slow_client_is_dropped_and_kicked() {
        let hub = Hub::default();
        let game_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let (slow, _rx) = attach(&hub, game_id, user, 1);

        hub.broadcast(game_id, "first");
        assert_eq!(hub.client_count(), 1);
        hub.broadcast(game_id, "second");
        assert_eq!(hub.client_count(), 0);

        tokio::time::timeout(Duration::from_secs(1), slow.kicked())
            .await
            .expect("client should be kicked");
    }

    #[tokio::test]
    async fn detach_tracks_remaining_sockets() {
        let hub = Hub::default();
        let game_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let (first, _rx1) = attach(&hub, game_id, user, 4);
        let (second, _rx2) = attach(&hub, game_id, user, 4);

        assert!(hub.detach(game_id, first.id, user));
        assert!(!hub.detach(game_id, second.id, user));
        assert!(hub.clients.get(&game_id).is_none());
    }

    #[tokio::test]
    async fn rtt_comes_from_latest_socket() {
        let hub = Hub::default();
        let game_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let (old, _rx1) = attach(&hub, game_id, user, 4);
        let (fresh, _rx2) = attach(&hub, game_id, user, 4);
        old.rtt().record(Duration::from_millis(300));
        fresh.rtt().record(Duration::from_millis(40));

        assert_eq!(hub.client_rtt(game_id, user), Duration::from_millis(40));
        assert_eq!(hub.client_rtt(game_id, Uuid::new_v4()), Duration::ZERO);
    }

    /// Hub with one registered session whose only participant is `user`.
    fn hub_with_session(user: Uuid) -> (Arc<Hub>, Arc<GameManager>, Uuid) {
        use crate::{
            dao::{event_log::TracingEventLogger, game_store::MemoryGameStore},
            services::manager::ManagerDeps,
            state::{
                game::{Player, Role, Session, Settings},
                pack::{QuestionType, tests::sample_pack},
            },
        };

        let hub = Hub::new();
        let pack = sample_pack(&[QuestionType::Normal]);
        let mut session = Session::new(Uuid::new_v4(), pack.id, Settings::default(), pack.rounds);
        session
            .add_player(Player::new(user, "alice".into(), None, Role::Player))
            .unwrap();
        let game_id = session.id;
        let store = MemoryGameStore::new(Duration::from_secs(60));
        let manager = GameManager::new(
            session,
            ManagerDeps {
                broadcaster: hub.clone(),
                events: Arc::new(TracingEventLogger::new()),
                repository: Arc::new(store.clone()),
                cache: Arc::new(store),
            },
        );
        hub.register_game_manager(game_id, manager.clone());
        (hub, manager, game_id)
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_session_leaves_hub_and_closes_sockets() {
        let user = Uuid::new_v4();
        let (hub, manager, game_id) = hub_with_session(user);
        manager.start().await;
        let (client, _rx) = attach(&hub, game_id, user, 16);

        manager.cancel().await.unwrap();
        assert!(manager.is_stopped());
        assert_eq!(hub.session_count(), 0);
        assert_eq!(hub.client_count(), 0);
        assert!(hub.manager(game_id).is_none());
        tokio::time::timeout(Duration::from_secs(1), client.kicked())
            .await
            .expect("client should be kicked");
    }

    #[tokio::test(start_paused = true)]
    async fn registered_socket_gets_snapshot_and_presence() {
        let user = Uuid::new_v4();
        let (hub, manager, game_id) = hub_with_session(user);
        manager.start().await;

        let (tx, mut rx) = mpsc::channel(16);
        let client = ClientHandle::new(game_id, user, tx);
        assert!(hub.register(client.clone()).await);
        let frame: serde_json::Value =
            serde_json::from_str(&text(rx.recv().await.unwrap())).unwrap();
        assert_eq!(frame["type"], "STATE_UPDATE");
        assert_eq!(frame["payload"]["game_id"], game_id.to_string());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(manager.entity().await.players[0].is_connected);

        hub.unregister(&client).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!manager.entity().await.players[0].is_connected);
        assert_eq!(hub.client_count(), 0);

        hub.unregister_game_manager(game_id);
        assert!(manager.is_stopped());
    }

    #[tokio::test]
    async fn shutdown_kicks_every_socket() {
        let hub = Hub::default();
        let (client, _rx) = attach(&hub, Uuid::new_v4(), Uuid::new_v4(), 4);

        assert_eq!(hub.shutdown(), 0);
        assert_eq!(hub.client_count(), 0);
        tokio::time::timeout(Duration::from_secs(1), client.kicked())
            .await
            .expect("client should be kicked");
    }

    #[tokio::test]
    async fn unknown_session_gets_error_frame() {
        let hub = Hub::default();
        let (tx, mut rx) = mpsc::channel(4);
        let client = ClientHandle::new(Uuid::new_v4(), Uuid::new_v4(), tx);

        assert!(!hub.register(client).await);
        let frame: serde_json::Value = serde_json::from_str(&text(rx.recv().await.unwrap())).unwrap();
        assert_eq!(frame["type"], "ERROR");
        assert_eq!(frame["payload"]["code"], "GAME_NOT_FOUND");
        assert_eq!(hub.client_count(), 0);
    }
}
