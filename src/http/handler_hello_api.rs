//! Handles GET /hello - OAuth-protected demo endpoint that greets the token's user

use axum::Json;
use serde_json::{Value, json};

use super::middleware_auth::ExtractedGrant;

/// Handle OAuth-protected hello API endpoint
/// GET /hello - Returns the grant behind a valid bearer token
pub async fn handle_hello_api(ExtractedGrant(grant): ExtractedGrant) -> Json<Value> {
    tracing::debug!(
        client_id = %grant.client_id,
        user_id = %grant.user_id,
        scope = ?grant.scope,
        "hello api accessed"
    );

    Json(json!({
        "message": format!("Hello, {}", grant.user_id),
        "user": grant.user_id,
        "client_id": grant.client_id,
        "scope": grant.scope,
    }))
}
