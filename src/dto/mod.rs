use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// REST bodies of the game endpoints.
pub mod game;
/// Health check response.
pub mod health;
/// Session snapshot projection.
pub mod state;
/// Custom request validators.
pub mod validation;
/// Session socket protocol.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
