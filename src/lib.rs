//! Library crate for the room registry, exposing modules for binaries and integration tests.

pub mod config;
/// Persistence layer.
pub mod dao;
/// Wire and REST data transfer objects.
pub mod dto;
/// Error types of every layer.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Business services behind the routes.
pub mod services;
/// Shared application state.
pub mod state;
