//! Main router configuration assembling the OAuth and protected API endpoints.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::{
    context::AppState,
    handler_authorize::handle_oauth_authorize,
    handler_callback::handle_callback,
    handler_health::handle_health,
    handler_hello_api::handle_hello_api,
    handler_oauth::{handle_oauth_revoke, handle_oauth_token},
};

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/authorize", get(handle_oauth_authorize))
        .route("/token", post(handle_oauth_token))
        .route("/revoke", post(handle_oauth_revoke))
        .route("/callback", get(handle_callback))
        .route("/hello", get(handle_hello_api))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
