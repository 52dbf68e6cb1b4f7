use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Duration, MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, PingPayload, ServerMessage},
    services::{
        hub::{ClientHandle, Hub},
        rtt::unix_millis,
    },
    state::SharedState,
};

/// Handle the full lifecycle of one session socket.
pub async fn handle_socket(state: SharedState, socket: WebSocket, game_id: Uuid, user_id: Uuid) {
    let config = state.config();
    let hub = state.hub().clone();
    let (sender, mut receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(config.client_send_buffer);

    // Dedicated writer task keeps outbound messages and pings flowing while we await inbound frames.
    let writer_task = tokio::spawn(write_loop(sender, outbound_rx, config.ping_interval));

    let client = ClientHandle::new(game_id, user_id, outbound_tx.clone());
    if !hub.register(client.clone()).await {
        info!(%game_id, %user_id, "socket refused: unknown game");
        let _ = outbound_tx.try_send(Message::Close(None));
        drop(client);
        finalize(writer_task, outbound_tx).await;
        return;
    }
    info!(%game_id, %user_id, conn_id = %client.id, "client connected");

    loop {
        let message = tokio::select! {
            _ = client.kicked() => {
                info!(%game_id, %user_id, conn_id = %client.id, "client kicked");
                break;
            }
            message = receiver.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => handle_text(&hub, &client, text.as_str()).await,
            Some(Ok(Message::Ping(payload))) => {
                let _ = outbound_tx.try_send(Message::Pong(payload));
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(%game_id, %user_id, "client closed socket");
                let _ = outbound_tx.try_send(Message::Close(frame));
                break;
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(%game_id, %user_id, "binary frames are not part of the protocol");
            }
            Some(Ok(Message::Pong(_))) => {}
            Some(Err(err)) => {
                warn!(%game_id, %user_id, error = %err, "websocket error");
                break;
            }
            None => break,
        }
    }

    hub.unregister(&client).await;
    info!(%game_id, %user_id, conn_id = %client.id, "client disconnected");

    drop(client);
    finalize(writer_task, outbound_tx).await;
}

/// Decode one text frame: pongs feed the RTT tracker, actions go to the session manager.
async fn handle_text(hub: &Hub, client: &ClientHandle, text: &str) {
    match ClientMessage::from_json_str(text) {
        Ok(ClientMessage::Pong(pong)) => {
            match client.rtt().record_pong(pong.server_time, unix_millis()) {
                Some(rtt) => debug!(
                    user_id = %client.user_id,
                    rtt_ms = rtt.as_millis() as u64,
                    smoothed_ms = client.rtt().smoothed().as_millis() as u64,
                    "rtt sample"
                ),
                None => debug!(user_id = %client.user_id, server_time = pong.server_time, "implausible pong ignored"),
            }
        }
        Ok(ClientMessage::Action(action)) => {
            debug!(game_id = %client.game_id, user_id = %client.user_id, action = action.kind(), "client action");
            hub.handle_message(client, action).await;
        }
        Err(err) => {
            warn!(game_id = %client.game_id, user_id = %client.user_id, error = %err, "failed to decode client message");
        }
    }
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Message>,
    ping_interval: Duration,
) {
    let mut ping = interval(ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick resolves immediately
    ping.tick().await;

    loop {
        let message = tokio::select! {
            message = outbound_rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
            _ = ping.tick() => match ping_frame() {
                Some(frame) => frame,
                None => continue,
            },
        };
        let closing = matches!(message, Message::Close(_));
        if sender.send(message).await.is_err() || closing {
            break;
        }
    }
}

fn ping_frame() -> Option<Message> {
    let ping = ServerMessage::Ping(PingPayload {
        server_time: unix_millis(),
    });
    serde_json::to_string(&ping)
        .inspect_err(|err| warn!(error = %err, "failed to serialize ping"))
        .ok()
        .map(|payload| Message::Text(Utf8Bytes::from(payload)))
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::Sender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
