//! OAuth 2 core types and data structures.
//!
//! Defines the client, authorization code, and token records shared by the
//! stores, the grant engine, and the validator, plus the wire-level request and
//! response shapes of the token endpoint.

use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// OAuth 2 Grant Types accepted at the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

/// OAuth 2 Token Types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Bearer,
}

/// Kind of a stored token record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl std::str::FromStr for TokenKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            other => Err(format!("unknown token kind: {}", other)),
        }
    }
}

/// Registered client application
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Unique client identifier
    pub client_id: String,
    /// Shared secret, never sent back to the client
    #[serde(skip_serializing)]
    pub client_secret: String,
    /// Base URI every redirect must fall under
    pub redirect_domain: String,
    /// Display name
    pub client_name: Option<String>,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("redirect_domain", &self.redirect_domain)
            .field("client_name", &self.client_name)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// OAuth Authorization Request, after the query string has been parsed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Response type as sent by the client
    pub response_type: String,
    /// Client ID
    pub client_id: String,
    /// Redirect URI
    pub redirect_uri: String,
    /// Requested scope
    pub scope: Option<String>,
    /// State parameter, echoed back verbatim
    pub state: Option<String>,
}

/// OAuth Authorization Code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The authorization code
    pub code: String,
    /// Client ID that requested this code
    pub client_id: String,
    /// User ID that authorized this code
    pub user_id: String,
    /// Redirect URI used in the authorization request
    pub redirect_uri: String,
    /// Granted scope
    pub scope: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Set when the code has been redeemed
    pub used_at: Option<DateTime<Utc>>,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Access or refresh token record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// The token value
    pub token: String,
    pub kind: TokenKind,
    pub client_id: String,
    pub user_id: String,
    /// Granted scope
    pub scope: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// The other half of the pair this token was minted with (lookup only)
    pub paired_token: Option<String>,
    /// Set on explicit revocation
    pub revoked_at: Option<DateTime<Utc>>,
    /// Set when a refresh token is spent by rotation
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Linked access and refresh token minted together
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: Token,
    pub refresh: Token,
}

/// Values and lifetimes for a pair that has not been bound to a grant yet.
///
/// Stores call [`PairTemplate::mint`] inside their atomic section once they
/// know the client, user and scope of the code or refresh token being spent.
/// Minting cannot fail.
#[derive(Debug, Clone)]
pub struct PairTemplate {
    pub access_value: String,
    pub refresh_value: String,
    pub issued_at: DateTime<Utc>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl PairTemplate {
    /// Generate fresh token values for a pair issued now
    pub fn new(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access_value: generate_token(),
            refresh_value: generate_token(),
            issued_at: Utc::now(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn mint(&self, client_id: &str, user_id: &str, scope: Option<&str>) -> TokenPair {
        let access = Token {
            token: self.access_value.clone(),
            kind: TokenKind::Access,
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.map(str::to_string),
            created_at: self.issued_at,
            expires_at: self.issued_at + self.access_ttl,
            paired_token: Some(self.refresh_value.clone()),
            revoked_at: None,
            consumed_at: None,
        };
        let refresh = Token {
            token: self.refresh_value.clone(),
            kind: TokenKind::Refresh,
            expires_at: self.issued_at + self.refresh_ttl,
            paired_token: Some(self.access_value.clone()),
            ..access.clone()
        };
        TokenPair { access, refresh }
    }
}

/// The (user, client, scope) tuple a valid access token asserts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub user_id: String,
    pub client_id: String,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Grant {
    pub fn scopes(&self) -> HashSet<String> {
        self.scope.as_deref().map(parse_scope).unwrap_or_default()
    }
}

impl From<&Token> for Grant {
    fn from(token: &Token) -> Self {
        Self {
            user_id: token.user_id.clone(),
            client_id: token.client_id.clone(),
            scope: token.scope.clone(),
            expires_at: token.expires_at,
        }
    }
}

/// Token Exchange Request
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// Grant type
    pub grant_type: GrantType,
    /// Authorization code (for authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI (for authorization_code grant)
    pub redirect_uri: Option<String>,
    /// Refresh token (for refresh_token grant)
    pub refresh_token: Option<String>,
    /// Client ID
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
}

/// Token Response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Token type
    pub token_type: TokenType,
    /// Expires in seconds
    pub expires_in: u64,
    /// Refresh token
    pub refresh_token: String,
    /// Granted scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<&TokenPair> for TokenResponse {
    fn from(pair: &TokenPair) -> Self {
        let expires_in = (pair.access.expires_at - pair.access.created_at)
            .num_seconds()
            .max(0) as u64;
        Self {
            access_token: pair.access.token.clone(),
            token_type: TokenType::Bearer,
            expires_in,
            refresh_token: pair.refresh.token.clone(),
            scope: pair.access.scope.clone(),
        }
    }
}

/// OAuth Error Response body (RFC 6749 Section 5.2)
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    /// Error code
    pub error: String,
    /// Error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthErrorResponse {
    pub fn new(error: &str, description: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            error_description: Some(description.to_string()),
        }
    }
}

/// Generate a secure random token (256 bits, base64url)
pub fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.r#gen();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a client ID
pub fn generate_client_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validate scope string
pub fn validate_scope(scope: &str) -> bool {
    scope.split_whitespace().all(|s| {
        s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.')
    })
}

/// Parse scope string into a set
pub fn parse_scope(scope: &str) -> HashSet<String> {
    scope.split_whitespace().map(|s| s.to_string()).collect()
}
