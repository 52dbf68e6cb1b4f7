use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::game::{
        ActiveGameResponse, CreateGameRequest, CreateGameResponse, GameSummary, UserQuery,
    },
    error::AppError,
    services::game_service,
    state::SharedState,
};

/// Routes handling session creation and lookup.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/active", get(active_game))
        .route("/games/{id}", get(get_game))
        .route("/games/{id}/cancel", post(cancel_game))
}

/// Start a session for a lobby room.
#[utoipa::path(
    post,
    path = "/games",
    tag = "game",
    request_body = CreateGameRequest,
    responses(
        (status = 201, description = "Game created and started", body = CreateGameResponse),
        (status = 400, description = "Invalid roster or settings"),
        (status = 404, description = "Pack not found")
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateGameRequest>>,
) -> Result<(StatusCode, Json<CreateGameResponse>), AppError> {
    let created = game_service::create_game(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Fetch a session summary.
#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "game",
    params(("id" = Uuid, Path, description = "Identifier of the game")),
    responses(
        (status = 200, description = "Game found", body = GameSummary),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameSummary>, AppError> {
    let summary = game_service::get_game(&state, id).await?;
    Ok(Json(summary))
}

/// Running session of a user, used to rejoin after a reload.
#[utoipa::path(
    get,
    path = "/games/active",
    tag = "game",
    params(UserQuery),
    responses((status = 200, description = "Active game lookup", body = ActiveGameResponse))
)]
pub async fn active_game(
    State(state): State<SharedState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ActiveGameResponse>, AppError> {
    let response = game_service::active_game_for_user(&state, query.user_id).await?;
    Ok(Json(response))
}

/// Abort a running session.
#[utoipa::path(
    post,
    path = "/games/{id}/cancel",
    tag = "game",
    params(("id" = Uuid, Path, description = "Identifier of the game")),
    responses(
        (status = 200, description = "Game cancelled", body = GameSummary),
        (status = 404, description = "Game is not running"),
        (status = 409, description = "Game already over")
    )
)]
pub async fn cancel_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameSummary>, AppError> {
    let summary = game_service::cancel_game(&state, id).await?;
    Ok(Json(summary))
}
