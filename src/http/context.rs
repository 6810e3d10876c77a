//! Application state shared by every handler.

use std::sync::Arc;

use crate::config::Config;
use crate::oauth::decision::AuthenticationDecider;
use crate::oauth::grant_engine::GrantEngine;
use crate::oauth::validator::Validator;
use crate::storage::traits::OAuthStorage;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// OAuth storage for tokens, clients, and codes
    pub oauth_storage: Arc<dyn OAuthStorage>,
    pub grant_engine: Arc<GrantEngine>,
    /// Bearer token validator for protected routes
    pub validator: Validator,
    /// Decides who the resource owner is at the authorize endpoint
    pub decider: Arc<dyn AuthenticationDecider>,
}

impl AppState {
    /// Wire the engine and validator to a storage backend using the configured lifetimes
    pub fn new(
        config: Arc<Config>,
        oauth_storage: Arc<dyn OAuthStorage>,
        decider: Arc<dyn AuthenticationDecider>,
    ) -> Self {
        let grant_engine = GrantEngine::new(oauth_storage.clone()).with_lifetimes(
            *config.auth_code_lifetime.as_ref(),
            *config.access_token_lifetime.as_ref(),
            *config.refresh_token_lifetime.as_ref(),
        );

        Self {
            validator: Validator::new(oauth_storage.clone()),
            grant_engine: Arc::new(grant_engine),
            oauth_storage,
            decider,
            config,
        }
    }
}
