//! HTTP and WebSocket API
//!
//! Axum adapter over the game engines. The engines never depend on it.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{build_state, create_app, ApiServer};
