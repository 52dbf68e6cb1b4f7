use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Quiz Live Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::create_game,
        crate::routes::game::get_game,
        crate::routes::game::active_game,
        crate::routes::game::cancel_game,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::CreateGameRequest,
            crate::dto::game::CreateGameResponse,
            crate::dto::game::GameSummary,
            crate::dto::game::ActiveGameResponse,
            crate::dto::state::GameStateSnapshot,
            crate::dto::ws::SelectQuestionPayload,
            crate::dto::ws::AnswerPayload,
            crate::dto::ws::JudgeAnswerPayload,
            crate::dto::ws::PongPayload,
            crate::dto::ws::MediaLoadProgressPayload,
            crate::dto::ws::MediaLoadCompletePayload,
            crate::dto::ws::TransferSecretPayload,
            crate::dto::ws::PlaceStakePayload,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Session creation and lookup"),
        (name = "session", description = "Live session WebSocket"),
    )
)]
pub struct ApiDoc;
