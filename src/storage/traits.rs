//! Storage trait definitions for clients, authorization codes and tokens.
//!
//! Every backend must implement the two check-and-invalidate primitives
//! (`consume_code` / `redeem_code` and `rotate_refresh`) as a single atomic
//! step scoped to the record being touched.

use crate::errors::{CodeError, RefreshError, StorageError, ValidationError};
use crate::oauth::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for storing and retrieving registered clients
#[async_trait]
pub trait OAuthClientStore: Send + Sync {
    /// Store a new client; fails with `DuplicateKey` if the ID is taken
    async fn store_client(&self, client: &OAuthClient) -> Result<()>;

    /// Retrieve a client by exact ID
    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>>;

    /// Delete a client, returning whether it existed
    async fn delete_client(&self, client_id: &str) -> Result<bool>;

    /// List clients (for admin purposes)
    async fn list_clients(&self, limit: Option<usize>) -> Result<Vec<OAuthClient>>;
}

/// Trait for storing and redeeming authorization codes
#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync {
    /// Store a new authorization code; fails with `DuplicateKey` on collision
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Atomically check and invalidate a code.
    ///
    /// A client or redirect mismatch leaves the code redeemable by its owner.
    async fn consume_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> std::result::Result<AuthorizationCode, CodeError>;

    /// Clean up expired codes
    async fn cleanup_expired_codes(&self) -> Result<usize>;

    /// Generate, record and return a new code for an approved request
    async fn issue_code(
        &self,
        client_id: &str,
        user_id: &str,
        scope: Option<&str>,
        redirect_uri: &str,
        ttl: Duration,
    ) -> Result<AuthorizationCode> {
        let mut attempts = 0;
        loop {
            let now = Utc::now();
            let code = AuthorizationCode {
                code: generate_token(),
                client_id: client_id.to_string(),
                user_id: user_id.to_string(),
                redirect_uri: redirect_uri.to_string(),
                scope: scope.map(str::to_string),
                created_at: now,
                expires_at: now + ttl,
                used_at: None,
            };
            match self.store_code(&code).await {
                Ok(()) => return Ok(code),
                Err(StorageError::DuplicateKey(_)) if attempts < MAX_ISSUE_ATTEMPTS => {
                    attempts += 1;
                    tracing::warn!(attempts, "authorization code collision, regenerating");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Collisions are practically impossible at 256 bits; this only bounds the loop.
const MAX_ISSUE_ATTEMPTS: u32 = 3;

/// Trait for storing and retrieving access and refresh tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store a freshly minted pair
    async fn store_pair(&self, pair: &TokenPair) -> Result<()>;

    /// Retrieve a token of either kind, whatever its state
    async fn get_token(&self, token: &str) -> Result<Option<Token>>;

    /// Atomically spend a refresh token and store the pair minted from it
    async fn rotate_refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        template: &PairTemplate,
    ) -> std::result::Result<TokenPair, RefreshError>;

    /// Mark a token revoked. Idempotent; returns the record if it exists.
    async fn revoke_token(&self, token: &str) -> Result<Option<Token>>;

    /// Clean up expired tokens
    async fn cleanup_expired_tokens(&self) -> Result<usize>;

    /// Mint and store a linked access/refresh pair
    async fn issue_access_and_refresh(
        &self,
        client_id: &str,
        user_id: &str,
        scope: Option<&str>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<TokenPair> {
        let pair = PairTemplate::new(access_ttl, refresh_ttl).mint(client_id, user_id, scope);
        self.store_pair(&pair).await?;
        Ok(pair)
    }

    /// Resolve a live access token
    async fn lookup_access(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<Token, ValidationError> {
        let token = self
            .get_token(token)
            .await?
            .filter(|t| t.kind == TokenKind::Access)
            .ok_or(ValidationError::Invalid)?;

        if token.is_revoked() {
            return Err(ValidationError::Revoked);
        }
        if token.is_expired(now) {
            return Err(ValidationError::Expired);
        }
        Ok(token)
    }
}

/// Unified storage interface used by the grant engine and validator
#[async_trait]
pub trait OAuthStorage: OAuthClientStore + AuthorizationCodeStore + TokenStore {
    /// Consume a code and store the pair minted from it as one atomic unit.
    ///
    /// After `Ok`, the code is spent and both tokens are durable; after `Err`,
    /// no token was written.
    async fn redeem_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        template: &PairTemplate,
    ) -> std::result::Result<(AuthorizationCode, TokenPair), CodeError>;
}
