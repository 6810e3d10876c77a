//! Handles POST /token and POST /revoke

use axum::{
    Form, Json,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use super::{
    context::AppState,
    utils_oauth::{no_store, oauth_error_response},
};
use crate::errors::OAuthError;
use crate::oauth::{
    grant_engine::{RevokeForm, TokenForm, extract_client_auth},
    types::TokenRequest,
};

/// Handle OAuth token requests
/// POST /token - Exchanges authorization codes and refresh tokens for token pairs
pub async fn handle_oauth_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return no_store(oauth_error_response(&OAuthError::InvalidRequest(
                rejection.body_text(),
            )));
        }
    };

    // Extract client authentication from Authorization header or form
    let client_auth = extract_client_auth(
        &headers,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    );

    let request = match TokenRequest::try_from(form) {
        Ok(request) => request,
        Err(e) => return no_store(oauth_error_response(&e)),
    };

    match state.grant_engine.token(request, client_auth).await {
        Ok(response) => no_store(Json(response).into_response()),
        Err(e) => no_store(oauth_error_response(&e)),
    }
}

/// Handle OAuth token revocation (RFC 7009)
/// POST /revoke - Always 200 for authenticated clients, whether or not the token existed
pub async fn handle_oauth_revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<RevokeForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return oauth_error_response(&OAuthError::InvalidRequest(rejection.body_text()));
        }
    };

    let Some(client_auth) = extract_client_auth(
        &headers,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    ) else {
        return oauth_error_response(&OAuthError::InvalidClient(
            "Missing client credentials".to_string(),
        ));
    };
    let Some(client_secret) = client_auth.client_secret.as_deref() else {
        return oauth_error_response(&OAuthError::InvalidClient(
            "Missing client secret".to_string(),
        ));
    };
    let Some(token) = form.token.as_deref().filter(|t| !t.is_empty()) else {
        return oauth_error_response(&OAuthError::InvalidRequest("Missing token".to_string()));
    };

    if let Some(hint) = form.token_type_hint.as_deref() {
        tracing::debug!(hint, "token_type_hint ignored, kind is looked up");
    }

    match state
        .grant_engine
        .revoke(token, &client_auth.client_id, client_secret)
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => oauth_error_response(&e),
    }
}
