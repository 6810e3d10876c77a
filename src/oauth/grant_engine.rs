//! Authorization-code grant engine: code issuance, code exchange, refresh
//! rotation and revocation.

use crate::errors::OAuthError;
use crate::oauth::clients::ClientRegistry;
use crate::oauth::decision::Decision;
use crate::oauth::types::*;
use crate::storage::traits::OAuthStorage;
use base64::prelude::*;
use chrono::Duration;
use http::HeaderMap;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Issues, exchanges and rotates credentials for registered clients
pub struct GrantEngine {
    storage: Arc<dyn OAuthStorage>,
    clients: ClientRegistry,
    /// Authorization code lifetime
    auth_code_ttl: Duration,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl GrantEngine {
    /// Create a grant engine with the default lifetimes (10m / 2h / 30d)
    pub fn new(storage: Arc<dyn OAuthStorage>) -> Self {
        Self {
            clients: ClientRegistry::new(storage.clone()),
            storage,
            auth_code_ttl: Duration::minutes(10),
            access_token_ttl: Duration::hours(2),
            refresh_token_ttl: Duration::days(30),
        }
    }

    pub fn with_lifetimes(
        mut self,
        auth_code_ttl: Duration,
        access_token_ttl: Duration,
        refresh_token_ttl: Duration,
    ) -> Self {
        self.auth_code_ttl = auth_code_ttl;
        self.access_token_ttl = access_token_ttl;
        self.refresh_token_ttl = refresh_token_ttl;
        self
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Check the client and redirect URI of an authorization request.
    ///
    /// Nothing may be sent to `redirect_uri` unless this succeeds.
    pub async fn validate_authorization_request(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<OAuthClient, OAuthError> {
        let client = self.clients.lookup(&request.client_id).await?;

        if !ClientRegistry::redirect_allowed(&client, &request.redirect_uri) {
            tracing::warn!(
                client_id = %client.client_id,
                redirect_uri = %request.redirect_uri,
                "redirect uri outside registered domain"
            );
            return Err(OAuthError::RedirectMismatch(request.redirect_uri.clone()));
        }

        Ok(client)
    }

    /// Handle authorization requests (RFC 6749 Section 4.1.1)
    ///
    /// The redirect is validated before the decision is looked at, so an
    /// `AccessDenied` error always refers to a redirect URI that may be used.
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
        decision: Decision,
    ) -> Result<AuthorizationCode, OAuthError> {
        self.validate_authorization_request(request).await?;

        if request.response_type != "code" {
            return Err(OAuthError::UnsupportedResponseType(
                request.response_type.clone(),
            ));
        }

        let scope = normalize_scope(request.scope.as_deref())?;

        let user_id = match decision {
            Decision::Approved(user_id) => user_id,
            Decision::Denied => {
                tracing::info!(client_id = %request.client_id, "authorization denied");
                return Err(OAuthError::AccessDenied(
                    "The resource owner denied the request".to_string(),
                ));
            }
        };

        let code = self
            .storage
            .issue_code(
                &request.client_id,
                &user_id,
                scope.as_deref(),
                &request.redirect_uri,
                self.auth_code_ttl,
            )
            .await
            .inspect_err(|e| tracing::error!(error = ?e, "failed to store authorization code"))?;

        tracing::info!(
            client_id = %code.client_id,
            user_id = %code.user_id,
            scope = ?code.scope,
            "issued authorization code"
        );
        Ok(code)
    }

    /// Redeem an authorization code for an access/refresh pair.
    ///
    /// The code is consumed and the pair stored in one storage operation, so
    /// a failure leaves no tokens behind and a success leaves no live code.
    pub async fn exchange_code(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<TokenPair, OAuthError> {
        self.authenticate_client(client_id, client_secret).await?;

        let template = PairTemplate::new(self.access_token_ttl, self.refresh_token_ttl);
        let (auth_code, pair) = self
            .storage
            .redeem_code(code, client_id, redirect_uri, &template)
            .await
            .map_err(|e| {
                tracing::warn!(client_id = %client_id, error = %e, "authorization code rejected");
                OAuthError::from(e)
            })?;

        tracing::info!(
            client_id = %client_id,
            user_id = %auth_code.user_id,
            access_token = %token_prefix(&pair.access.token),
            "exchanged authorization code"
        );
        Ok(pair)
    }

    /// Spend a refresh token and issue the next pair.
    ///
    /// The access token minted alongside the spent refresh token stays valid
    /// until its own expiry.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenPair, OAuthError> {
        self.authenticate_client(client_id, client_secret).await?;

        let template = PairTemplate::new(self.access_token_ttl, self.refresh_token_ttl);
        let pair = self
            .storage
            .rotate_refresh(refresh_token, client_id, &template)
            .await
            .map_err(|e| {
                tracing::warn!(client_id = %client_id, error = %e, "refresh token rejected");
                OAuthError::from(e)
            })?;

        tracing::info!(
            client_id = %client_id,
            user_id = %pair.refresh.user_id,
            access_token = %token_prefix(&pair.access.token),
            "rotated refresh token"
        );
        Ok(pair)
    }

    /// Handle token requests (RFC 6749 Section 4.1.3 and Section 6)
    pub async fn token(
        &self,
        request: TokenRequest,
        client_auth: Option<ClientAuthentication>,
    ) -> Result<TokenResponse, OAuthError> {
        let credentials = client_auth
            .or_else(|| {
                request.client_id.clone().map(|client_id| ClientAuthentication {
                    client_id,
                    client_secret: request.client_secret.clone(),
                })
            })
            .ok_or_else(|| OAuthError::InvalidClient("Missing client credentials".to_string()))?;
        let client_secret = credentials
            .client_secret
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidClient("Missing client secret".to_string()))?;

        let pair = match request.grant_type {
            GrantType::AuthorizationCode => {
                let code = request.code.as_deref().ok_or_else(|| {
                    OAuthError::InvalidRequest("Missing authorization code".to_string())
                })?;
                let redirect_uri = request
                    .redirect_uri
                    .as_deref()
                    .ok_or_else(|| OAuthError::InvalidRequest("Missing redirect URI".to_string()))?;

                self.exchange_code(code, &credentials.client_id, client_secret, redirect_uri)
                    .await?
            }
            GrantType::RefreshToken => {
                let refresh_token = request.refresh_token.as_deref().ok_or_else(|| {
                    OAuthError::InvalidRequest("Missing refresh token".to_string())
                })?;

                self.refresh(refresh_token, &credentials.client_id, client_secret)
                    .await?
            }
        };

        Ok(TokenResponse::from(&pair))
    }

    /// Revoke a token on behalf of the client it was issued to (RFC 7009).
    ///
    /// Unknown tokens and tokens owned by other clients are ignored. Revoking
    /// a refresh token also revokes the access token minted with it.
    pub async fn revoke(
        &self,
        token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(), OAuthError> {
        self.authenticate_client(client_id, client_secret).await?;

        let Some(record) = self.storage.get_token(token).await? else {
            tracing::debug!(client_id = %client_id, "revocation of unknown token ignored");
            return Ok(());
        };

        if record.client_id != client_id {
            tracing::warn!(client_id = %client_id, "revocation of another client's token ignored");
            return Ok(());
        }

        self.storage.revoke_token(&record.token).await?;

        if record.kind == TokenKind::Refresh {
            if let Some(paired) = record.paired_token.as_deref() {
                self.storage.revoke_token(paired).await?;
            }
        }

        tracing::info!(
            client_id = %client_id,
            kind = record.kind.as_str(),
            token = %token_prefix(&record.token),
            "revoked token"
        );
        Ok(())
    }

    /// Authenticate a client at the token or revocation endpoint
    async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<OAuthClient, OAuthError> {
        self.clients
            .verify(client_id, client_secret)
            .await
            .map_err(|e| match e {
                OAuthError::UnknownClient(_) | OAuthError::ClientAuthFailed(_) => {
                    OAuthError::InvalidClient(format!("Client authentication failed for {}", client_id))
                }
                other => other,
            })
    }
}

fn normalize_scope(scope: Option<&str>) -> Result<Option<String>, OAuthError> {
    let Some(scope) = scope.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if !validate_scope(scope) {
        return Err(OAuthError::InvalidScope(scope.to_string()));
    }
    Ok(Some(scope.split_whitespace().collect::<Vec<_>>().join(" ")))
}

/// Enough of a token value to correlate log lines
fn token_prefix(value: &str) -> &str {
    value.get(..8).unwrap_or(value)
}

/// Build the success redirect for an issued code
pub fn code_redirect(
    redirect_uri: &str,
    code: &str,
    state: Option<&str>,
) -> Result<String, OAuthError> {
    let mut redirect_url = Url::parse(redirect_uri)
        .map_err(|e| OAuthError::InvalidRequest(format!("Invalid redirect URI: {}", e)))?;

    redirect_url.query_pairs_mut().append_pair("code", code);
    if let Some(state) = state {
        redirect_url.query_pairs_mut().append_pair("state", state);
    }

    Ok(redirect_url.to_string())
}

/// Build an error redirect; only for redirect URIs that passed validation
pub fn error_redirect(
    redirect_uri: &str,
    error: &OAuthError,
    state: Option<&str>,
) -> Result<String, OAuthError> {
    let mut redirect_url = Url::parse(redirect_uri)
        .map_err(|e| OAuthError::InvalidRequest(format!("Invalid redirect URI: {}", e)))?;

    redirect_url
        .query_pairs_mut()
        .append_pair("error", error.error_code())
        .append_pair("error_description", &error.to_string());
    if let Some(state) = state {
        redirect_url.query_pairs_mut().append_pair("state", state);
    }

    Ok(redirect_url.to_string())
}

/// Client credentials presented at the token or revocation endpoint
#[derive(Clone)]
pub struct ClientAuthentication {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Query parameters for authorization endpoint
#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
}

impl TryFrom<AuthorizeQuery> for AuthorizationRequest {
    type Error = OAuthError;

    fn try_from(query: AuthorizeQuery) -> Result<Self, Self::Error> {
        let client_id = query
            .client_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("Missing client_id".to_string()))?;
        let redirect_uri = query
            .redirect_uri
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("Missing redirect_uri".to_string()))?;
        let response_type = query
            .response_type
            .ok_or_else(|| OAuthError::InvalidRequest("Missing response_type".to_string()))?;

        Ok(Self {
            response_type,
            client_id,
            redirect_uri,
            scope: query.scope,
            state: query.state,
        })
    }
}

/// Form data for token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl TryFrom<TokenForm> for TokenRequest {
    type Error = OAuthError;

    fn try_from(form: TokenForm) -> Result<Self, Self::Error> {
        let grant_type = match form.grant_type.as_deref() {
            Some("authorization_code") => GrantType::AuthorizationCode,
            Some("refresh_token") => GrantType::RefreshToken,
            Some(other) => return Err(OAuthError::UnsupportedGrantType(other.to_string())),
            None => return Err(OAuthError::InvalidRequest("Missing grant_type".to_string())),
        };

        Ok(Self {
            grant_type,
            code: form.code,
            redirect_uri: form.redirect_uri,
            refresh_token: form.refresh_token,
            client_id: form.client_id,
            client_secret: form.client_secret,
        })
    }
}

/// Form data for revocation endpoint
#[derive(Debug, Deserialize)]
pub struct RevokeForm {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Extract client authentication from the Authorization header or form fields.
///
/// HTTP Basic credentials take precedence over form parameters.
pub fn extract_client_auth(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Option<ClientAuthentication> {
    if let Some(credentials) = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic_credentials)
    {
        return Some(credentials);
    }

    form_client_id.map(|client_id| ClientAuthentication {
        client_id: client_id.to_string(),
        client_secret: form_client_secret.map(str::to_string),
    })
}

fn parse_basic_credentials(header: &str) -> Option<ClientAuthentication> {
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = credentials.split_once(':')?;

    Some(ClientAuthentication {
        client_id: form_urldecode(client_id)?,
        client_secret: Some(form_urldecode(client_secret)?),
    })
}

/// Basic credentials are form-urlencoded before base64 (RFC 6749 section 2.3.1)
fn form_urldecode(value: &str) -> Option<String> {
    urlencoding::decode(&value.replace('+', " "))
        .ok()
        .map(|decoded| decoded.into_owned())
}
