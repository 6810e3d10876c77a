//! In-memory OAuth storage implementation

use crate::errors::{CodeError, RefreshError, StorageError};
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// In-memory implementation for OAuth storage.
///
/// Lock order is always `auth_codes` before `tokens`; no path holds a token
/// guard while touching the code map.
#[derive(Default)]
pub struct MemoryOAuthStorage {
    clients: DashMap<String, OAuthClient>,
    auth_codes: DashMap<String, AuthorizationCode>,
    tokens: DashMap<String, Token>,
}

impl MemoryOAuthStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-invalidate under the code's shard lock
    fn take_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
        template: Option<&PairTemplate>,
    ) -> std::result::Result<(AuthorizationCode, Option<TokenPair>), CodeError> {
        let mut entry = self.auth_codes.get_mut(code).ok_or(CodeError::NotFound)?;
        let auth_code = entry.value_mut();

        if auth_code.used_at.is_some() {
            return Err(CodeError::AlreadyUsed);
        }
        if auth_code.is_expired(now) {
            return Err(CodeError::Expired);
        }
        if auth_code.client_id != client_id {
            return Err(CodeError::ClientMismatch);
        }
        if auth_code.redirect_uri != redirect_uri {
            return Err(CodeError::RedirectMismatch);
        }

        auth_code.used_at = Some(now);

        // Pair is written before the code guard is released
        let pair = template.map(|template| {
            let pair = template.mint(
                &auth_code.client_id,
                &auth_code.user_id,
                auth_code.scope.as_deref(),
            );
            self.insert_pair(&pair);
            pair
        });

        Ok((auth_code.clone(), pair))
    }

    fn insert_pair(&self, pair: &TokenPair) {
        self.tokens
            .insert(pair.access.token.clone(), pair.access.clone());
        self.tokens
            .insert(pair.refresh.token.clone(), pair.refresh.clone());
    }
}

#[async_trait]
impl OAuthClientStore for MemoryOAuthStorage {
    async fn store_client(&self, client: &OAuthClient) -> Result<()> {
        match self.clients.entry(client.client_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::DuplicateKey(format!(
                "client {}",
                client.client_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                Ok(())
            }
        }
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        Ok(self.clients.get(client_id).map(|c| c.value().clone()))
    }

    async fn delete_client(&self, client_id: &str) -> Result<bool> {
        Ok(self.clients.remove(client_id).is_some())
    }

    async fn list_clients(&self, limit: Option<usize>) -> Result<Vec<OAuthClient>> {
        let mut result: Vec<_> = self.clients.iter().map(|c| c.value().clone()).collect();
        result.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }
}

#[async_trait]
impl AuthorizationCodeStore for MemoryOAuthStorage {
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()> {
        match self.auth_codes.entry(code.code.clone()) {
            Entry::Occupied(_) => Err(StorageError::DuplicateKey(
                "authorization code".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(code.clone());
                Ok(())
            }
        }
    }

    async fn consume_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> std::result::Result<AuthorizationCode, CodeError> {
        let (auth_code, _) = self.take_code(code, client_id, redirect_uri, Utc::now(), None)?;
        Ok(auth_code)
    }

    async fn cleanup_expired_codes(&self) -> Result<usize> {
        let now = Utc::now();
        let initial_count = self.auth_codes.len();
        self.auth_codes.retain(|_, code| !code.is_expired(now));

        Ok(initial_count.saturating_sub(self.auth_codes.len()))
    }
}

#[async_trait]
impl TokenStore for MemoryOAuthStorage {
    async fn store_pair(&self, pair: &TokenPair) -> Result<()> {
        self.insert_pair(pair);
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Option<Token>> {
        Ok(self.tokens.get(token).map(|t| t.value().clone()))
    }

    async fn rotate_refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        template: &PairTemplate,
    ) -> std::result::Result<TokenPair, RefreshError> {
        let spent = {
            let mut entry = self
                .tokens
                .get_mut(refresh_token)
                .ok_or(RefreshError::NotFound)?;
            let token = entry.value_mut();

            if token.kind != TokenKind::Refresh {
                return Err(RefreshError::NotFound);
            }
            if token.consumed_at.is_some() || token.is_revoked() {
                return Err(RefreshError::AlreadyUsed);
            }
            if token.is_expired(template.issued_at) {
                return Err(RefreshError::Expired);
            }
            if token.client_id != client_id {
                return Err(RefreshError::ClientMismatch);
            }

            token.consumed_at = Some(template.issued_at);
            token.clone()
        };

        // The shard guard is released before inserting into the same map
        let pair = template.mint(&spent.client_id, &spent.user_id, spent.scope.as_deref());
        self.insert_pair(&pair);
        Ok(pair)
    }

    async fn revoke_token(&self, token: &str) -> Result<Option<Token>> {
        Ok(self.tokens.get_mut(token).map(|mut entry| {
            let record = entry.value_mut();
            if record.revoked_at.is_none() {
                record.revoked_at = Some(Utc::now());
            }
            record.clone()
        }))
    }

    async fn cleanup_expired_tokens(&self) -> Result<usize> {
        let now = Utc::now();
        let initial_count = self.tokens.len();
        self.tokens.retain(|_, token| !token.is_expired(now));

        Ok(initial_count.saturating_sub(self.tokens.len()))
    }
}

#[async_trait]
impl OAuthStorage for MemoryOAuthStorage {
    async fn redeem_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        template: &PairTemplate,
    ) -> std::result::Result<(AuthorizationCode, TokenPair), CodeError> {
        let (auth_code, pair) = self.take_code(
            code,
            client_id,
            redirect_uri,
            template.issued_at,
            Some(template),
        )?;
        let pair = pair.ok_or_else(|| {
            CodeError::Storage(StorageError::InvalidData(
                "pair was not minted for redeemed code".to_string(),
            ))
        })?;
        Ok((auth_code, pair))
    }
}
