use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status, always "ok" while the process serves requests.
    pub status: String,
    /// Sessions with a running manager.
    pub active_sessions: usize,
    /// Sockets registered across all sessions.
    pub connected_clients: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(active_sessions: usize, connected_clients: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_sessions,
            connected_clients,
        }
    }
}
