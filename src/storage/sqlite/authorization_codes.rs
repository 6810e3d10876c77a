//! SQLite implementation for authorization code storage

use super::{from_millis, map_write_error, optional_millis, to_millis};
use crate::errors::{CodeError, StorageError};
use crate::oauth::types::*;
use crate::storage::traits::{AuthorizationCodeStore, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};

/// SQLite implementation of authorization code storage
pub struct SqliteAuthorizationCodeStore {
    pool: SqlitePool,
}

impl SqliteAuthorizationCodeStore {
    /// Create a new SQLite authorization code store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Convert SQLite row to AuthorizationCode
fn row_to_authorization_code(row: &SqliteRow) -> Result<AuthorizationCode> {
    let created_at: i64 = row
        .try_get("created_at")
        .map_err(|e| StorageError::DatabaseError(format!("Failed to get created_at: {}", e)))?;
    let expires_at: i64 = row
        .try_get("expires_at")
        .map_err(|e| StorageError::DatabaseError(format!("Failed to get expires_at: {}", e)))?;
    let used_at: Option<i64> = row
        .try_get("used_at")
        .map_err(|e| StorageError::DatabaseError(format!("Failed to get used_at: {}", e)))?;

    Ok(AuthorizationCode {
        code: row
            .try_get("code")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get code: {}", e)))?,
        client_id: row
            .try_get("client_id")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get client_id: {}", e)))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get user_id: {}", e)))?,
        redirect_uri: row.try_get("redirect_uri").map_err(|e| {
            StorageError::DatabaseError(format!("Failed to get redirect_uri: {}", e))
        })?,
        scope: row
            .try_get("scope")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get scope: {}", e)))?,
        created_at: from_millis(created_at)?,
        expires_at: from_millis(expires_at)?,
        used_at: optional_millis(used_at)?,
    })
}

/// Mark a code used if every condition holds, classifying the failure otherwise.
///
/// The conditional UPDATE is the check-and-invalidate step: of two racing
/// callers only one sees a returned row.
pub(super) async fn take_code(
    conn: &mut SqliteConnection,
    code: &str,
    client_id: &str,
    redirect_uri: &str,
    now: DateTime<Utc>,
) -> std::result::Result<AuthorizationCode, CodeError> {
    let now_ms = to_millis(now);
    let updated = sqlx::query(
        r#"
        UPDATE authorization_codes SET used_at = ?
        WHERE code = ? AND used_at IS NULL AND expires_at > ?
          AND client_id = ? AND redirect_uri = ?
        RETURNING *
        "#,
    )
    .bind(now_ms)
    .bind(code)
    .bind(now_ms)
    .bind(client_id)
    .bind(redirect_uri)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

    if let Some(row) = updated {
        return Ok(row_to_authorization_code(&row)?);
    }

    let row = sqlx::query("SELECT * FROM authorization_codes WHERE code = ?")
        .bind(code)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StorageError::DatabaseError(e.to_string()))?
        .ok_or(CodeError::NotFound)?;
    let existing = row_to_authorization_code(&row)?;

    Err(if existing.used_at.is_some() {
        CodeError::AlreadyUsed
    } else if existing.is_expired(now) {
        CodeError::Expired
    } else if existing.client_id != client_id {
        CodeError::ClientMismatch
    } else if existing.redirect_uri != redirect_uri {
        CodeError::RedirectMismatch
    } else {
        CodeError::AlreadyUsed
    })
}

#[async_trait]
impl AuthorizationCodeStore for SqliteAuthorizationCodeStore {
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO authorization_codes (
                code, client_id, user_id, redirect_uri, scope, created_at, expires_at, used_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.user_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(to_millis(code.created_at))
        .bind(to_millis(code.expires_at))
        .bind(code.used_at.map(to_millis))
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "authorization code"))?;

        Ok(())
    }

    async fn consume_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> std::result::Result<AuthorizationCode, CodeError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        let auth_code = take_code(&mut *tx, code, client_id, redirect_uri, Utc::now()).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(auth_code)
    }

    async fn cleanup_expired_codes(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at <= ?")
            .bind(to_millis(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }
}
