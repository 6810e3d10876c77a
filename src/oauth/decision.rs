//! Resource-owner authentication decision.
//!
//! Login and consent UI live outside this crate. The authorize endpoint hands
//! the incoming request to an [`AuthenticationDecider`] and passes the outcome
//! to the grant engine.

use async_trait::async_trait;
use http::{HeaderMap, HeaderName};

/// What the decider gets to see about the resource owner's request
#[derive(Debug, Clone)]
pub struct UserSession {
    pub client_id: String,
    pub scope: Option<String>,
    pub headers: HeaderMap,
}

/// Outcome of the resource owner's authentication and consent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approved(String),
    Denied,
}

#[async_trait]
pub trait AuthenticationDecider: Send + Sync {
    async fn decide(&self, session: &UserSession) -> Decision;
}

/// Approves the user named by a header set by an authenticating proxy.
///
/// Only safe when that proxy strips the header from client requests.
pub struct TrustedHeaderDecider {
    header: HeaderName,
}

impl TrustedHeaderDecider {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

#[async_trait]
impl AuthenticationDecider for TrustedHeaderDecider {
    async fn decide(&self, session: &UserSession) -> Decision {
        match session
            .headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
        {
            Some(user_id) if !user_id.is_empty() => Decision::Approved(user_id.to_string()),
            _ => {
                tracing::debug!(client_id = %session.client_id, header = %self.header, "no authenticated user");
                Decision::Denied
            }
        }
    }
}

/// Approves every request as one configured user (development setups)
pub struct FixedUserDecider {
    user_id: String,
}

impl FixedUserDecider {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl AuthenticationDecider for FixedUserDecider {
    async fn decide(&self, _session: &UserSession) -> Decision {
        Decision::Approved(self.user_id.clone())
    }
}
