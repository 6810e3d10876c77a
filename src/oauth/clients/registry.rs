//! Registered client lookup, authentication and redirect checks.

use crate::errors::{OAuthError, StorageError};
use crate::oauth::types::OAuthClient;
use crate::storage::traits::OAuthStorage;
use chrono::Utc;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use url::Url;

/// Read-mostly view over the client records held by the storage backend
#[derive(Clone)]
pub struct ClientRegistry {
    storage: Arc<dyn OAuthStorage>,
}

impl ClientRegistry {
    pub fn new(storage: Arc<dyn OAuthStorage>) -> Self {
        Self { storage }
    }

    /// Exact-match lookup of a registered client
    pub async fn lookup(&self, client_id: &str) -> Result<OAuthClient, OAuthError> {
        self.storage
            .get_client(client_id)
            .await?
            .ok_or_else(|| OAuthError::UnknownClient(client_id.to_string()))
    }

    /// Whether `secret` is the registered secret of `client_id`.
    ///
    /// Unknown clients simply fail to authenticate.
    pub async fn authenticate(&self, client_id: &str, secret: &str) -> Result<bool, StorageError> {
        Ok(self
            .storage
            .get_client(client_id)
            .await?
            .is_some_and(|client| secret_matches(&client, secret)))
    }

    /// Look up a client and check its secret in one step
    pub async fn verify(&self, client_id: &str, secret: &str) -> Result<OAuthClient, OAuthError> {
        let client = self.lookup(client_id).await?;
        if !secret_matches(&client, secret) {
            tracing::warn!(client_id = %client_id, "client secret mismatch");
            return Err(OAuthError::ClientAuthFailed(client_id.to_string()));
        }
        Ok(client)
    }

    /// Register a client under a caller-chosen ID
    pub async fn register(
        &self,
        client_id: &str,
        client_secret: &str,
        redirect_domain: &str,
        client_name: Option<&str>,
    ) -> Result<OAuthClient, OAuthError> {
        if client_id.trim().is_empty() {
            return Err(OAuthError::InvalidRequest(
                "client_id must not be empty".to_string(),
            ));
        }
        if client_secret.is_empty() {
            return Err(OAuthError::InvalidRequest(
                "client_secret must not be empty".to_string(),
            ));
        }
        validate_redirect_domain(redirect_domain)?;

        let client = OAuthClient {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_domain: redirect_domain.to_string(),
            client_name: client_name.map(str::to_string),
            created_at: Utc::now(),
        };

        match self.storage.store_client(&client).await {
            Ok(()) => {}
            Err(StorageError::DuplicateKey(_)) => {
                return Err(OAuthError::InvalidRequest(format!(
                    "client {} is already registered",
                    client_id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(client_id = %client_id, redirect_domain = %redirect_domain, "registered client");
        Ok(client)
    }

    /// Registered clients ordered by client ID
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<OAuthClient>, OAuthError> {
        Ok(self.storage.list_clients(limit).await?)
    }

    /// Remove a client, returning whether it existed
    pub async fn remove(&self, client_id: &str) -> Result<bool, OAuthError> {
        let removed = self.storage.delete_client(client_id).await?;
        if removed {
            tracing::info!(client_id = %client_id, "removed client");
        }
        Ok(removed)
    }

    /// Whether `redirect_uri` falls under the client's registered redirect domain.
    ///
    /// Scheme and port must match exactly, the host must equal the registered
    /// host or be a subdomain of it, and the path must equal or nest under the
    /// registered path. URIs carrying a fragment or userinfo never match.
    pub fn redirect_allowed(client: &OAuthClient, redirect_uri: &str) -> bool {
        let (Ok(registered), Ok(candidate)) =
            (Url::parse(&client.redirect_domain), Url::parse(redirect_uri))
        else {
            return false;
        };

        if candidate.fragment().is_some()
            || !candidate.username().is_empty()
            || candidate.password().is_some()
        {
            return false;
        }

        if registered.scheme() != candidate.scheme()
            || registered.port_or_known_default() != candidate.port_or_known_default()
        {
            return false;
        }

        let (Some(registered_host), Some(candidate_host)) =
            (registered.host_str(), candidate.host_str())
        else {
            return false;
        };
        let host_ok = candidate_host.eq_ignore_ascii_case(registered_host)
            || candidate_host
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", registered_host.to_ascii_lowercase()));
        if !host_ok {
            return false;
        }

        let base = registered.path().trim_end_matches('/');
        let path = candidate.path();
        base.is_empty() || path == base || path.starts_with(&format!("{}/", base))
    }
}

fn secret_matches(client: &OAuthClient, secret: &str) -> bool {
    client
        .client_secret
        .as_bytes()
        .ct_eq(secret.as_bytes())
        .into()
}

fn validate_redirect_domain(redirect_domain: &str) -> Result<(), OAuthError> {
    let parsed = Url::parse(redirect_domain).map_err(|e| {
        OAuthError::InvalidRequest(format!("Invalid redirect domain format: {}", e))
    })?;

    if parsed.host_str().is_none() {
        return Err(OAuthError::InvalidRequest(
            "Redirect domain must include a host".to_string(),
        ));
    }

    if parsed.fragment().is_some() {
        return Err(OAuthError::InvalidRequest(
            "Redirect domain must not contain fragment".to_string(),
        ));
    }

    Ok(())
}
