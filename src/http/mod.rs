//! Axum HTTP server handlers and middleware for the OAuth 2 endpoints.

pub mod context;
mod handler_authorize;
mod handler_callback;
mod handler_health;
mod handler_hello_api;
mod handler_oauth;
pub mod middleware_auth;
pub mod server;
mod utils_oauth;

pub use context::AppState;
pub use server::build_router;
