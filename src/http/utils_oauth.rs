//! OAuth error responses shared by the authorization server endpoints.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use crate::errors::OAuthError;
use crate::oauth::types::OAuthErrorResponse;

/// Render an OAuth error as `{error, error_description}` with its HTTP status
pub fn oauth_error_response(error: &OAuthError) -> Response {
    let status = error.status_code();
    if status.is_server_error() {
        tracing::error!(error = ?error, "oauth request failed");
    } else {
        tracing::debug!(error = %error, "oauth request rejected");
    }

    let body = OAuthErrorResponse::new(error.error_code(), error);

    let mut response = (status, Json(body)).into_response();
    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"authgate\""),
        );
    }
    response
}

/// Responses carrying credentials must not be cached (RFC 6749 Section 5.1)
pub fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;

    #[test]
    fn test_oauth_error_response_status() {
        let response = oauth_error_response(&OAuthError::InvalidClient("bad".to_string()));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = oauth_error_response(&OAuthError::InvalidGrant("used".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = oauth_error_response(&OAuthError::ServerError(StorageError::DatabaseError(
            "disk".to_string(),
        )));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_oauth_error_response_body() {
        let response = oauth_error_response(&OAuthError::InvalidGrant("used".to_string()));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: OAuthErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "invalid_grant");
        assert!(body.error_description.unwrap().contains("used"));
    }

    #[test]
    fn test_no_store() {
        let response = no_store(StatusCode::OK.into_response());
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(response.headers()[header::PRAGMA], "no-cache");
    }
}
