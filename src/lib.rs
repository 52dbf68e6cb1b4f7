//! Library crate for quiz-live-back, exposing modules for binaries and integration tests.

/// Runtime configuration loaded at startup.
pub mod config;
/// Persistence collaborators and their in-memory implementations.
pub mod dao;
/// Wire types of the REST and WebSocket surfaces.
pub mod dto;
mod error;
/// Axum routers.
pub mod routes;
/// Session engine and use-cases.
pub mod services;
/// Runtime domain model and shared application state.
pub mod state;
