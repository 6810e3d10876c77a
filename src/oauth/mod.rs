//! OAuth 2 authorization-code server core: client registry, grant engine and
//! bearer token validation.

pub mod clients;
pub mod decision;
pub mod grant_engine;
pub mod types;
pub mod validator;

// Re-export frequently used items from each module
pub use crate::storage::{
    inmemory::MemoryOAuthStorage,
    traits::{AuthorizationCodeStore, OAuthClientStore, OAuthStorage, TokenStore},
};
pub use clients::ClientRegistry;
pub use decision::{
    AuthenticationDecider, Decision, FixedUserDecider, TrustedHeaderDecider, UserSession,
};
pub use grant_engine::{
    AuthorizeQuery, ClientAuthentication, GrantEngine, RevokeForm, TokenForm, extract_client_auth,
};
pub use types::{
    AuthorizationCode, AuthorizationRequest, Grant, GrantType, OAuthClient, OAuthErrorResponse,
    PairTemplate, Token, TokenKind, TokenPair, TokenRequest, TokenResponse, TokenType,
    parse_scope,
};
pub use validator::Validator;
