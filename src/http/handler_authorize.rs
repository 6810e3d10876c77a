//! Handles GET /authorize - Issues authorization codes for approved requests

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::{context::AppState, utils_oauth::oauth_error_response};
use crate::errors::OAuthError;
use crate::oauth::{
    decision::UserSession,
    grant_engine::{AuthorizeQuery, code_redirect, error_redirect},
    types::AuthorizationRequest,
};

/// Handle OAuth authorization requests
///
/// Approval redirects with `code`, denial redirects with `error=access_denied`.
/// Anything that fails before the redirect URI is validated is answered
/// directly with a JSON error.
pub async fn handle_oauth_authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let request = match AuthorizationRequest::try_from(query) {
        Ok(request) => request,
        Err(e) => return oauth_error_response(&e),
    };

    let session = UserSession {
        client_id: request.client_id.clone(),
        scope: request.scope.clone(),
        headers,
    };
    let decision = state.decider.decide(&session).await;

    let redirect = match state.grant_engine.authorize(&request, decision).await {
        Ok(code) => code_redirect(&request.redirect_uri, &code.code, request.state.as_deref()),
        Err(e @ OAuthError::AccessDenied(_)) => {
            error_redirect(&request.redirect_uri, &e, request.state.as_deref())
        }
        Err(e) => return oauth_error_response(&e),
    };

    match redirect {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(e) => oauth_error_response(&e),
    }
}
