use uuid::Uuid;

use crate::state::game::{Player, PlayerScore, Session};

/// Number of scoreboard entries reported as winners.
pub const WINNER_COUNT: usize = 3;

/// Non-host players ordered by score, highest first.
///
/// Ties keep join order and share the same competition rank (1, 1, 3, ...).
pub fn rank_players(session: &Session) -> Vec<PlayerScore> {
    let mut contenders: Vec<&Player> = session
        .players
        .values()
        .filter(|player| !player.is_host())
        .collect();
    // stable sort: join order survives among equal scores
    contenders.sort_by(|a, b| b.score.cmp(&a.score));

    let mut ranked = Vec::with_capacity(contenders.len());
    let mut previous: Option<(i32, u32)> = None;
    for (position, player) in contenders.into_iter().enumerate() {
        let rank = match previous {
            Some((score, rank)) if score == player.score => rank,
            _ => u32::try_from(position + 1).unwrap_or(u32::MAX),
        };
        previous = Some((player.score, rank));
        ranked.push(PlayerScore {
            user_id: player.user_id,
            username: player.username.clone(),
            score: player.score,
            rank,
        });
    }
    ranked
}

/// Head of a ranked scoreboard.
pub fn top_winners(final_scores: &[PlayerScore]) -> Vec<PlayerScore> {
    final_scores.iter().take(WINNER_COUNT).cloned().collect()
}

/// Bettor of a stake question: the eligible player with the lowest score, earliest joiner first.
pub(super) fn pick_bettor(session: &Session) -> Option<&Player> {
    session.eligible_players().min_by_key(|player| player.score)
}

/// Earliest joined eligible player.
pub(super) fn first_eligible(session: &Session) -> Option<Uuid> {
    session.eligible_players().next().map(|player| player.user_id)
}

/// Apply a score delta and return the change actually applied and the new score.
///
/// Scores are floored at zero, so the applied change can be smaller than `delta`.
pub(super) fn apply_score(session: &mut Session, user_id: Uuid, delta: i32) -> Option<(i32, i32)> {
    let player = session.players.get_mut(&user_id)?;
    let before = player.score;
    player.apply_delta(delta);
    Some((player.score - before, player.score))
}
