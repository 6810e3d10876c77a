//! Bearer token authentication for protected endpoints.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use http::request::Parts;
use crate::errors::ValidationError;
use crate::http::AppState;
use crate::oauth::types::{Grant, OAuthErrorResponse};

/// Authenticated grant extractor for protected endpoints
///
/// Validates the `Authorization: Bearer <token>` header against the token
/// store and yields the (user, client, scope) the token asserts.
///
/// ```ignore
/// async fn protected_handler(ExtractedGrant(grant): ExtractedGrant) -> String {
///     format!("Hello, {}", grant.user_id)
/// }
/// ```
#[derive(Clone, Debug)]
pub struct ExtractedGrant(pub Grant);

/// Create a bearer challenge response (RFC 6750 Section 3)
fn create_bearer_error_response(error: &ValidationError) -> Response {
    let status = error.status_code();
    let body = OAuthErrorResponse::new(error.error_code(), error);

    if status.is_server_error() {
        tracing::error!(error = ?error, "bearer token validation failed");
        return (status, axum::Json(body)).into_response();
    }

    let challenge = format!(
        "Bearer realm=\"authgate\", error=\"{}\", error_description=\"{}\"",
        error.error_code(),
        error
    );

    let mut response = (status, axum::Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

impl<S> FromRequestParts<S> for ExtractedGrant
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let auth_header = match parts.headers.get(header::AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| {
                create_bearer_error_response(&ValidationError::Malformed)
            })?),
            None => None,
        };

        match app_state.validator.validate_header(auth_header).await {
            Ok(grant) => Ok(ExtractedGrant(grant)),
            Err(e) => {
                tracing::debug!(error = %e, "rejected bearer token");
                Err(create_bearer_error_response(&e))
            }
        }
    }
}
