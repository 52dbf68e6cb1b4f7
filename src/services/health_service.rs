use tracing::debug;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness with the number of running sessions and attached sockets.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let hub = state.hub();
    let (sessions, clients) = (hub.session_count(), hub.client_count());
    debug!(sessions, clients, "health check");
    HealthResponse::ok(sessions, clients)
}
