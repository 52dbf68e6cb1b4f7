/// OpenAPI documentation generation.
pub mod documentation;
/// REST use-cases creating and looking up sessions.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Registry routing frames between sockets and session managers.
pub mod hub;
/// Per-session state machine driving a game.
pub mod manager;
/// Round trip time tracking of sockets.
pub mod rtt;
/// WebSocket connection and message handling service.
pub mod websocket_service;
