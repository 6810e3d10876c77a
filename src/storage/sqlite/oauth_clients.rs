//! SQLite implementation for client storage

use super::{from_millis, map_write_error, to_millis};
use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::{OAuthClientStore, Result};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

/// SQLite implementation of client storage
pub struct SqliteOAuthClientStore {
    pool: SqlitePool,
}

impl SqliteOAuthClientStore {
    /// Create a new SQLite client store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Convert SQLite row to OAuthClient
    fn row_to_client(row: &SqliteRow) -> Result<OAuthClient> {
        let created_at: i64 = row
            .try_get("created_at")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get created_at: {}", e)))?;

        Ok(OAuthClient {
            client_id: row.try_get("client_id").map_err(|e| {
                StorageError::DatabaseError(format!("Failed to get client_id: {}", e))
            })?,
            client_secret: row.try_get("client_secret").map_err(|e| {
                StorageError::DatabaseError(format!("Failed to get client_secret: {}", e))
            })?,
            redirect_domain: row.try_get("redirect_domain").map_err(|e| {
                StorageError::DatabaseError(format!("Failed to get redirect_domain: {}", e))
            })?,
            client_name: row.try_get("client_name").map_err(|e| {
                StorageError::DatabaseError(format!("Failed to get client_name: {}", e))
            })?,
            created_at: from_millis(created_at)?,
        })
    }
}

#[async_trait]
impl OAuthClientStore for SqliteOAuthClientStore {
    async fn store_client(&self, client: &OAuthClient) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_clients (
                client_id, client_secret, redirect_domain, client_name, created_at
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.client_secret)
        .bind(&client.redirect_domain)
        .bind(&client.client_name)
        .bind(to_millis(client.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &format!("client {}", client.client_id)))?;

        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        let row = sqlx::query("SELECT * FROM oauth_clients WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        row.as_ref().map(Self::row_to_client).transpose()
    }

    async fn delete_client(&self, client_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM oauth_clients WHERE client_id = ?")
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_clients(&self, limit: Option<usize>) -> Result<Vec<OAuthClient>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query("SELECT * FROM oauth_clients ORDER BY client_id LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_client).collect()
    }
}
