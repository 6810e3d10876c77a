//! Bearer token validation for protected resources.

use crate::errors::ValidationError;
use crate::oauth::types::Grant;
use crate::storage::traits::OAuthStorage;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Resolves bearer credentials to the grant they assert. Read-only.
#[derive(Clone)]
pub struct Validator {
    storage: Arc<dyn OAuthStorage>,
}

impl Validator {
    pub fn new(storage: Arc<dyn OAuthStorage>) -> Self {
        Self { storage }
    }

    /// Validate a bare access token value
    pub async fn validate(&self, bearer: &str) -> Result<Grant, ValidationError> {
        self.validate_at(bearer, Utc::now()).await
    }

    /// Validate as of `now`; a token is expired once `now >= expires_at`
    pub async fn validate_at(
        &self,
        bearer: &str,
        now: DateTime<Utc>,
    ) -> Result<Grant, ValidationError> {
        if bearer.is_empty() {
            return Err(ValidationError::Missing);
        }
        if !is_base64url(bearer) {
            return Err(ValidationError::Malformed);
        }

        let token = self.storage.lookup_access(bearer, now).await?;
        Ok(Grant::from(&token))
    }

    /// Validate the value of an `Authorization` header
    pub async fn validate_header(&self, header: Option<&str>) -> Result<Grant, ValidationError> {
        let token = extract_bearer(header)?;
        self.validate(token).await
    }
}

/// Extract the token from `Bearer <token>`; the scheme is case-insensitive
pub fn extract_bearer(header: Option<&str>) -> Result<&str, ValidationError> {
    let header = header.ok_or(ValidationError::Missing)?;
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(ValidationError::Malformed)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ValidationError::Malformed);
    }

    let token = token.trim();
    if token.is_empty() || !is_base64url(token) {
        return Err(ValidationError::Malformed);
    }
    Ok(token)
}

fn is_base64url(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
