//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

use crate::{dto::game::PlayerInput, state::game::Role};

/// Validates that a roster has exactly one host and no duplicate accounts.
pub fn validate_roster(players: &[PlayerInput]) -> Result<(), ValidationError> {
    let hosts = players
        .iter()
        .filter(|player| player.role == Role::Host)
        .count();
    if hosts != 1 {
        let mut err = ValidationError::new("roster_host");
        err.message = Some(format!("Exactly one host is required (got {hosts})").into());
        return Err(err);
    }

    let mut seen = HashSet::with_capacity(players.len());
    if let Some(duplicate) = players.iter().find(|player| !seen.insert(player.user_id)) {
        let mut err = ValidationError::new("roster_duplicate");
        err.message = Some(format!("Player `{}` is listed twice", duplicate.user_id).into());
        return Err(err);
    }

    Ok(())
}
