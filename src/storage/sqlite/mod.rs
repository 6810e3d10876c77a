//! SQLite storage implementations
//!
//! This module provides SQLite-based implementations of all storage traits.
//! SQLite is suitable for single-instance deployments and development.
//! Timestamps are stored as unix milliseconds.

mod authorization_codes;
mod oauth_clients;
mod tokens;

use crate::errors::{CodeError, RefreshError, StorageError};
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use authorization_codes::SqliteAuthorizationCodeStore;
pub use oauth_clients::SqliteOAuthClientStore;
pub use tokens::SqliteTokenStore;

pub(crate) fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn from_millis(value: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| StorageError::InvalidData(format!("Invalid timestamp: {}", value)))
}

pub(crate) fn optional_millis(value: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    value.map(from_millis).transpose()
}

/// Map an INSERT failure, surfacing primary key collisions as `DuplicateKey`
pub(crate) fn map_write_error(err: sqlx::Error, what: &str) -> StorageError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => StorageError::DuplicateKey(what.to_string()),
        _ => StorageError::DatabaseError(err.to_string()),
    }
}

/// Open a connection pool, creating the database file if needed
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| StorageError::ConnectionFailed(format!("Invalid SQLite URL: {}", e)))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    // Each connection to an in-memory database sees its own empty database
    let max_connections = if database_url.contains(":memory:") { 1 } else { 10 };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| StorageError::ConnectionFailed(format!("SQLite connection failed: {}", e)))
}

/// Comprehensive SQLite OAuth storage implementation
pub struct SqliteOAuthStorage {
    pool: SqlitePool,
    client_store: Arc<SqliteOAuthClientStore>,
    authorization_code_store: Arc<SqliteAuthorizationCodeStore>,
    token_store: Arc<SqliteTokenStore>,
}

impl SqliteOAuthStorage {
    /// Create a new SQLite OAuth storage instance
    pub fn new(pool: SqlitePool) -> Self {
        let client_store = Arc::new(SqliteOAuthClientStore::new(pool.clone()));
        let authorization_code_store = Arc::new(SqliteAuthorizationCodeStore::new(pool.clone()));
        let token_store = Arc::new(SqliteTokenStore::new(pool.clone()));

        Self {
            pool,
            client_store,
            authorization_code_store,
            token_store,
        }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl OAuthClientStore for SqliteOAuthStorage {
    async fn store_client(&self, client: &OAuthClient) -> Result<()> {
        self.client_store.store_client(client).await
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        self.client_store.get_client(client_id).await
    }

    async fn delete_client(&self, client_id: &str) -> Result<bool> {
        self.client_store.delete_client(client_id).await
    }

    async fn list_clients(&self, limit: Option<usize>) -> Result<Vec<OAuthClient>> {
        self.client_store.list_clients(limit).await
    }
}

#[async_trait]
impl AuthorizationCodeStore for SqliteOAuthStorage {
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()> {
        self.authorization_code_store.store_code(code).await
    }

    async fn consume_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> std::result::Result<AuthorizationCode, CodeError> {
        self.authorization_code_store
            .consume_code(code, client_id, redirect_uri)
            .await
    }

    async fn cleanup_expired_codes(&self) -> Result<usize> {
        self.authorization_code_store.cleanup_expired_codes().await
    }
}

#[async_trait]
impl TokenStore for SqliteOAuthStorage {
    async fn store_pair(&self, pair: &TokenPair) -> Result<()> {
        self.token_store.store_pair(pair).await
    }

    async fn get_token(&self, token: &str) -> Result<Option<Token>> {
        self.token_store.get_token(token).await
    }

    async fn rotate_refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        template: &PairTemplate,
    ) -> std::result::Result<TokenPair, RefreshError> {
        self.token_store
            .rotate_refresh(refresh_token, client_id, template)
            .await
    }

    async fn revoke_token(&self, token: &str) -> Result<Option<Token>> {
        self.token_store.revoke_token(token).await
    }

    async fn cleanup_expired_tokens(&self) -> Result<usize> {
        self.token_store.cleanup_expired_tokens().await
    }
}

#[async_trait]
impl OAuthStorage for SqliteOAuthStorage {
    async fn redeem_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        template: &PairTemplate,
    ) -> std::result::Result<(AuthorizationCode, TokenPair), CodeError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        let auth_code = authorization_codes::take_code(
            &mut *tx,
            code,
            client_id,
            redirect_uri,
            template.issued_at,
        )
        .await?;

        let pair = template.mint(
            &auth_code.client_id,
            &auth_code.user_id,
            auth_code.scope.as_deref(),
        );
        tokens::insert_pair(&mut *tx, &pair).await?;

        // Code consumption only becomes durable together with the pair
        tx.commit()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok((auth_code, pair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationError;
    use chrono::Duration;

    async fn test_storage() -> SqliteOAuthStorage {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = SqliteOAuthStorage::new(pool);
        storage.migrate().await.unwrap();
        storage
    }

    fn test_code(code: &str, expires_in: Duration) -> AuthorizationCode {
        let now = Utc::now();
        AuthorizationCode {
            code: code.to_string(),
            client_id: "c1".to_string(),
            user_id: "alice".to_string(),
            redirect_uri: "https://app/cb".to_string(),
            scope: Some("read".to_string()),
            created_at: now,
            expires_at: now + expires_in,
            used_at: None,
        }
    }

    fn template() -> PairTemplate {
        PairTemplate::new(Duration::hours(2), Duration::days(30))
    }

    #[tokio::test]
    async fn test_client_roundtrip() {
        let storage = test_storage().await;
        let client = OAuthClient {
            client_id: "c1".to_string(),
            client_secret: "s1".to_string(),
            redirect_domain: "https://app/cb".to_string(),
            client_name: Some("App".to_string()),
            created_at: Utc::now(),
        };

        storage.store_client(&client).await.unwrap();
        assert!(matches!(
            storage.store_client(&client).await,
            Err(StorageError::DuplicateKey(_))
        ));

        let loaded = storage.get_client("c1").await.unwrap().unwrap();
        assert_eq!(loaded.client_secret, "s1");
        assert_eq!(loaded.client_name.as_deref(), Some("App"));
        assert_eq!(storage.list_clients(Some(10)).await.unwrap().len(), 1);
        assert!(storage.delete_client("c1").await.unwrap());
        assert!(storage.get_client("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redeem_code_is_single_use() {
        let storage = test_storage().await;
        storage
            .store_code(&test_code("abc", Duration::minutes(10)))
            .await
            .unwrap();

        let (code, pair) = storage
            .redeem_code("abc", "c1", "https://app/cb", &template())
            .await
            .unwrap();
        assert_eq!(code.user_id, "alice");
        assert_eq!(pair.access.scope.as_deref(), Some("read"));

        let access = storage
            .lookup_access(&pair.access.token, Utc::now())
            .await
            .unwrap();
        assert_eq!(access.paired_token.as_deref(), Some(pair.refresh.token.as_str()));

        assert!(matches!(
            storage
                .redeem_code("abc", "c1", "https://app/cb", &template())
                .await,
            Err(CodeError::AlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn test_consume_code_classifies_failures() {
        let storage = test_storage().await;
        storage
            .store_code(&test_code("live", Duration::minutes(10)))
            .await
            .unwrap();
        storage
            .store_code(&test_code("stale", Duration::seconds(-1)))
            .await
            .unwrap();

        assert!(matches!(
            storage.consume_code("missing", "c1", "https://app/cb").await,
            Err(CodeError::NotFound)
        ));
        assert!(matches!(
            storage.consume_code("stale", "c1", "https://app/cb").await,
            Err(CodeError::Expired)
        ));
        assert!(matches!(
            storage.consume_code("live", "c2", "https://app/cb").await,
            Err(CodeError::ClientMismatch)
        ));
        assert!(matches!(
            storage.consume_code("live", "c1", "https://evil/cb").await,
            Err(CodeError::RedirectMismatch)
        ));
        assert!(
            storage
                .consume_code("live", "c1", "https://app/cb")
                .await
                .is_ok()
        );
        assert_eq!(storage.cleanup_expired_codes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_redeem_writes_no_tokens() {
        let storage = test_storage().await;
        storage
            .store_code(&test_code("abc", Duration::minutes(10)))
            .await
            .unwrap();

        let template = template();
        assert!(
            storage
                .redeem_code("abc", "c2", "https://app/cb", &template)
                .await
                .is_err()
        );
        assert!(
            storage
                .get_token(&template.access_value)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_rotate_and_revoke() {
        let storage = test_storage().await;
        let first = storage
            .issue_access_and_refresh("c1", "alice", Some("read"), Duration::hours(2), Duration::days(30))
            .await
            .unwrap();

        assert!(matches!(
            storage
                .rotate_refresh(&first.refresh.token, "c2", &template())
                .await,
            Err(RefreshError::ClientMismatch)
        ));

        let second = storage
            .rotate_refresh(&first.refresh.token, "c1", &template())
            .await
            .unwrap();
        assert_eq!(second.refresh.scope.as_deref(), Some("read"));

        assert!(matches!(
            storage
                .rotate_refresh(&first.refresh.token, "c1", &template())
                .await,
            Err(RefreshError::AlreadyUsed)
        ));
        assert!(matches!(
            storage
                .rotate_refresh(&first.access.token, "c1", &template())
                .await,
            Err(RefreshError::NotFound)
        ));

        let revoked = storage
            .revoke_token(&second.access.token)
            .await
            .unwrap()
            .unwrap();
        assert!(revoked.revoked_at.is_some());
        assert!(matches!(
            storage.lookup_access(&second.access.token, Utc::now()).await,
            Err(ValidationError::Revoked)
        ));
        assert!(storage.revoke_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired_tokens() {
        let storage = test_storage().await;
        storage
            .issue_access_and_refresh("c1", "alice", None, Duration::seconds(-2), Duration::seconds(-1))
            .await
            .unwrap();
        let live = storage
            .issue_access_and_refresh("c1", "alice", None, Duration::hours(2), Duration::days(30))
            .await
            .unwrap();

        assert_eq!(storage.cleanup_expired_tokens().await.unwrap(), 2);
        assert!(storage.get_token(&live.access.token).await.unwrap().is_some());
    }
}
