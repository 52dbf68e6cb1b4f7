use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{dto::game::UserQuery, services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/games/{id}/ws",
    tag = "session",
    params(
        ("id" = Uuid, Path, description = "Identifier of the game"),
        UserQuery
    ),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a session socket.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(game_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max_message_bytes = state.config().max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| {
            websocket_service::handle_socket(state, socket, game_id, query.user_id)
        })
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/games/{id}/ws", get(ws_handler))
}
