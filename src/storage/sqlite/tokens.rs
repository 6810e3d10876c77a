//! SQLite implementation for access and refresh token storage

use super::{from_millis, map_write_error, optional_millis, to_millis};
use crate::errors::{RefreshError, StorageError};
use crate::oauth::types::*;
use crate::storage::traits::{Result, TokenStore};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};

/// SQLite implementation of token storage
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    /// Create a new SQLite token store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Convert SQLite row to Token
fn row_to_token(row: &SqliteRow) -> Result<Token> {
    let get_err = |field: &str, e: sqlx::Error| {
        StorageError::DatabaseError(format!("Failed to get {}: {}", field, e))
    };

    let kind: String = row.try_get("kind").map_err(|e| get_err("kind", e))?;
    let kind = kind
        .parse::<TokenKind>()
        .map_err(StorageError::InvalidData)?;

    Ok(Token {
        token: row.try_get("token").map_err(|e| get_err("token", e))?,
        kind,
        client_id: row.try_get("client_id").map_err(|e| get_err("client_id", e))?,
        user_id: row.try_get("user_id").map_err(|e| get_err("user_id", e))?,
        scope: row.try_get("scope").map_err(|e| get_err("scope", e))?,
        created_at: from_millis(row.try_get("created_at").map_err(|e| get_err("created_at", e))?)?,
        expires_at: from_millis(row.try_get("expires_at").map_err(|e| get_err("expires_at", e))?)?,
        paired_token: row
            .try_get("paired_token")
            .map_err(|e| get_err("paired_token", e))?,
        revoked_at: optional_millis(
            row.try_get("revoked_at")
                .map_err(|e| get_err("revoked_at", e))?,
        )?,
        consumed_at: optional_millis(
            row.try_get("consumed_at")
                .map_err(|e| get_err("consumed_at", e))?,
        )?,
    })
}

async fn insert_token(conn: &mut SqliteConnection, token: &Token) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tokens (
            token, kind, client_id, user_id, scope, created_at, expires_at,
            paired_token, revoked_at, consumed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&token.token)
    .bind(token.kind.as_str())
    .bind(&token.client_id)
    .bind(&token.user_id)
    .bind(&token.scope)
    .bind(to_millis(token.created_at))
    .bind(to_millis(token.expires_at))
    .bind(&token.paired_token)
    .bind(token.revoked_at.map(to_millis))
    .bind(token.consumed_at.map(to_millis))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, "token"))?;

    Ok(())
}

/// Write both halves of a pair on the given connection
pub(super) async fn insert_pair(conn: &mut SqliteConnection, pair: &TokenPair) -> Result<()> {
    insert_token(conn, &pair.access).await?;
    insert_token(conn, &pair.refresh).await
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn store_pair(&self, pair: &TokenPair) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        insert_pair(&mut *tx, pair).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))
    }

    async fn get_token(&self, token: &str) -> Result<Option<Token>> {
        let row = sqlx::query("SELECT * FROM tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        row.as_ref().map(row_to_token).transpose()
    }

    async fn rotate_refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        template: &PairTemplate,
    ) -> std::result::Result<TokenPair, RefreshError> {
        let now = template.issued_at;
        let now_ms = to_millis(now);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        let spent = sqlx::query(
            r#"
            UPDATE tokens SET consumed_at = ?
            WHERE token = ? AND kind = 'refresh'
              AND consumed_at IS NULL AND revoked_at IS NULL
              AND expires_at > ? AND client_id = ?
            RETURNING *
            "#,
        )
        .bind(now_ms)
        .bind(refresh_token)
        .bind(now_ms)
        .bind(client_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        let spent = match spent {
            Some(row) => row_to_token(&row)?,
            None => {
                let existing = sqlx::query("SELECT * FROM tokens WHERE token = ?")
                    .bind(refresh_token)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| StorageError::DatabaseError(e.to_string()))?
                    .as_ref()
                    .map(row_to_token)
                    .transpose()?
                    .filter(|t| t.kind == TokenKind::Refresh)
                    .ok_or(RefreshError::NotFound)?;

                return Err(if existing.consumed_at.is_some() || existing.is_revoked() {
                    RefreshError::AlreadyUsed
                } else if existing.is_expired(now) {
                    RefreshError::Expired
                } else if existing.client_id != client_id {
                    RefreshError::ClientMismatch
                } else {
                    RefreshError::AlreadyUsed
                });
            }
        };

        let pair = template.mint(&spent.client_id, &spent.user_id, spent.scope.as_deref());
        insert_pair(&mut *tx, &pair).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(pair)
    }

    async fn revoke_token(&self, token: &str) -> Result<Option<Token>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        sqlx::query("UPDATE tokens SET revoked_at = ? WHERE token = ? AND revoked_at IS NULL")
            .bind(to_millis(Utc::now()))
            .bind(token)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        let row = sqlx::query("SELECT * FROM tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        row.as_ref().map(row_to_token).transpose()
    }

    async fn cleanup_expired_tokens(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at <= ?")
            .bind(to_millis(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }
}
