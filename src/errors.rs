//! Standardized error types following the `error-authgate-<domain>-<number>` format.

use http::StatusCode;
use thiserror::Error;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-authgate-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when PORT cannot be parsed
    #[error("error-authgate-config-2 Parsing PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-authgate-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when duration string cannot be parsed
    #[error("error-authgate-config-4 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when a bootstrap client entry is not `id:secret:redirect_domain`
    #[error("error-authgate-config-5 Invalid bootstrap client entry '{0}'")]
    InvalidBootstrapClient(String),

    /// Error when the authentication decision mode is unknown
    #[error("error-authgate-config-6 Unknown AUTH_DECISION mode '{0}': expected header or fixed")]
    UnknownDecisionMode(String),

    /// Error when token lifetimes are inconsistent
    #[error("error-authgate-config-7 Access token TTL ({0}) must be shorter than refresh token TTL ({1})")]
    InconsistentTokenLifetimes(String, String),

    /// Error when TRUSTED_USER_HEADER is not a valid header name
    #[error("error-authgate-config-8 Invalid TRUSTED_USER_HEADER '{0}'")]
    InvalidTrustedHeader(String),
}

/// OAuth protocol errors raised by the grant engine
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Client ID is not registered
    #[error("error-authgate-oauth-1 Unknown client: {0}")]
    UnknownClient(String),

    /// Client secret did not match
    #[error("error-authgate-oauth-2 Client authentication failed: {0}")]
    ClientAuthFailed(String),

    /// Redirect URI is outside the client's registered domain
    #[error("error-authgate-oauth-3 Redirect URI mismatch: {0}")]
    RedirectMismatch(String),

    /// Resource owner denied the request or is not logged in
    #[error("error-authgate-oauth-4 Access denied: {0}")]
    AccessDenied(String),

    /// Code or refresh token is expired, used, unknown, or bound elsewhere
    #[error("error-authgate-oauth-5 Invalid grant: {0}")]
    InvalidGrant(String),

    /// Client authentication failed at the token endpoint
    #[error("error-authgate-oauth-6 Invalid client credentials: {0}")]
    InvalidClient(String),

    /// Missing or malformed request parameter
    #[error("error-authgate-oauth-7 Invalid request: {0}")]
    InvalidRequest(String),

    /// Grant type other than authorization_code or refresh_token
    #[error("error-authgate-oauth-8 Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Response type other than code
    #[error("error-authgate-oauth-9 Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    /// Scope string contains invalid characters
    #[error("error-authgate-oauth-10 Invalid scope: {0}")]
    InvalidScope(String),

    /// Storage backend failure
    #[error("error-authgate-oauth-11 Server error: {0}")]
    ServerError(#[from] StorageError),
}

impl OAuthError {
    /// RFC 6749 error code for the response body
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::ClientAuthFailed(_) | OAuthError::InvalidClient(_) => "invalid_client",
            // The token endpoint maps unknown clients to InvalidClient first
            OAuthError::UnknownClient(_)
            | OAuthError::RedirectMismatch(_)
            | OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::AccessDenied(_) => "access_denied",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    /// HTTP status used when the error is returned directly (not redirected)
    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient(_) | OAuthError::ClientAuthFailed(_) => {
                StatusCode::UNAUTHORIZED
            }
            OAuthError::AccessDenied(_) => StatusCode::FORBIDDEN,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Authorization code consumption failures
#[derive(Debug, Error)]
pub enum CodeError {
    #[error("error-authgate-code-1 Authorization code not found")]
    NotFound,

    #[error("error-authgate-code-2 Authorization code already used")]
    AlreadyUsed,

    #[error("error-authgate-code-3 Authorization code expired")]
    Expired,

    #[error("error-authgate-code-4 Authorization code was issued to another client")]
    ClientMismatch,

    #[error("error-authgate-code-5 Redirect URI does not match the authorization request")]
    RedirectMismatch,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Refresh token rotation failures
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("error-authgate-refresh-1 Refresh token not found")]
    NotFound,

    #[error("error-authgate-refresh-2 Refresh token already used or revoked")]
    AlreadyUsed,

    #[error("error-authgate-refresh-3 Refresh token expired")]
    Expired,

    #[error("error-authgate-refresh-4 Refresh token was issued to another client")]
    ClientMismatch,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<CodeError> for OAuthError {
    fn from(err: CodeError) -> Self {
        match err {
            CodeError::Storage(e) => OAuthError::ServerError(e),
            other => OAuthError::InvalidGrant(other.to_string()),
        }
    }
}

impl From<RefreshError> for OAuthError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Storage(e) => OAuthError::ServerError(e),
            other => OAuthError::InvalidGrant(other.to_string()),
        }
    }
}

/// Bearer token validation failures
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("error-authgate-validate-1 Missing bearer token")]
    Missing,

    #[error("error-authgate-validate-2 Malformed bearer token")]
    Malformed,

    #[error("error-authgate-validate-3 Access token expired")]
    Expired,

    #[error("error-authgate-validate-4 Access token revoked")]
    Revoked,

    #[error("error-authgate-validate-5 Unknown access token")]
    Invalid,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ValidationError {
    /// RFC 6750 error code for the `WWW-Authenticate` challenge
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::Missing | ValidationError::Malformed => "invalid_request",
            ValidationError::Expired | ValidationError::Revoked | ValidationError::Invalid => {
                "invalid_token"
            }
            ValidationError::Storage(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ValidationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Database/storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error when database connection fails
    #[error("error-authgate-storage-1 Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Error when query execution fails
    #[error("error-authgate-storage-2 Query execution failed: {0}")]
    QueryFailed(String),

    /// Error when database operation fails
    #[error("error-authgate-storage-3 Database error: {0}")]
    DatabaseError(String),

    /// Error when data validation fails
    #[error("error-authgate-storage-4 Invalid data: {0}")]
    InvalidData(String),

    /// Error when a record would overwrite a live one
    #[error("error-authgate-storage-5 Duplicate key: {0}")]
    DuplicateKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_errors_collapse_to_invalid_grant() {
        for err in [
            CodeError::NotFound,
            CodeError::AlreadyUsed,
            CodeError::Expired,
            CodeError::ClientMismatch,
            CodeError::RedirectMismatch,
        ] {
            let oauth: OAuthError = err.into();
            assert_eq!(oauth.error_code(), "invalid_grant");
            assert_eq!(oauth.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_storage_faults_are_server_errors() {
        let oauth: OAuthError =
            RefreshError::Storage(StorageError::DatabaseError("disk".to_string())).into();
        assert_eq!(oauth.error_code(), "server_error");
        assert_eq!(oauth.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let validation = ValidationError::Storage(StorageError::QueryFailed("x".to_string()));
        assert_eq!(validation.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unknown_client_at_authorize_is_invalid_request() {
        let err = OAuthError::UnknownClient("nobody".to_string());
        assert_eq!(err.error_code(), "invalid_request");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_client_is_unauthorized() {
        let err = OAuthError::InvalidClient("bad secret".to_string());
        assert_eq!(err.error_code(), "invalid_client");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(err.to_string().starts_with("error-authgate-oauth-6"));
    }
}
