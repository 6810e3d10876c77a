//! Environment-based configuration types for authgate server runtime settings.

use anyhow::Result;
use http::HeaderName;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::oauth::decision::{AuthenticationDecider, FixedUserDecider, TrustedHeaderDecider};

/// HTTP server port configuration
#[derive(Clone)]
pub struct HttpPort(u16);

/// Authorization code lifetime
#[derive(Clone)]
pub struct AuthCodeLifetime(chrono::Duration);

/// Access token lifetime
#[derive(Clone)]
pub struct AccessTokenLifetime(chrono::Duration);

/// Refresh token lifetime
#[derive(Clone)]
pub struct RefreshTokenLifetime(chrono::Duration);

/// Period of the expired-record sweeper
#[derive(Clone)]
pub struct CleanupInterval(Duration);

/// How the authorize endpoint learns who the resource owner is
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthDecision {
    /// Trust a header set by an authenticating reverse proxy
    TrustedHeader(HeaderName),
    /// Approve every request as one user
    FixedUser(String),
}

/// Client registered at startup
#[derive(Clone)]
pub struct BootstrapClient {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_domain: String,
}

/// Clients registered at startup from `BOOTSTRAP_CLIENTS`
#[derive(Clone, Default)]
pub struct BootstrapClients(Vec<BootstrapClient>);

/// Main application configuration
#[derive(Clone)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub external_base: String,
    pub storage_backend: String,
    pub database_url: Option<String>,
    pub auth_code_lifetime: AuthCodeLifetime,
    pub access_token_lifetime: AccessTokenLifetime,
    pub refresh_token_lifetime: RefreshTokenLifetime,
    pub cleanup_interval: CleanupInterval,
    pub auth_decision: AuthDecision,
    pub bootstrap_clients: BootstrapClients,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let external_base = default_env("EXTERNAL_BASE", "http://localhost:8080");
        let storage_backend = default_env("STORAGE_BACKEND", "memory");
        let database_url = optional_env("DATABASE_URL");
        let auth_code_lifetime: AuthCodeLifetime =
            default_env("AUTH_CODE_TTL", "10m").try_into()?;
        let access_token_lifetime: AccessTokenLifetime =
            default_env("ACCESS_TOKEN_TTL", "2h").try_into()?;
        let refresh_token_lifetime: RefreshTokenLifetime =
            default_env("REFRESH_TOKEN_TTL", "30d").try_into()?;
        let cleanup_interval: CleanupInterval =
            default_env("CLEANUP_INTERVAL", "5m").try_into()?;
        let auth_decision = AuthDecision::from_parts(
            &default_env("AUTH_DECISION", "header"),
            &default_env("TRUSTED_USER_HEADER", "x-authenticated-user"),
            &default_env("FIXED_USER_ID", "demo-user"),
        )?;
        let bootstrap_clients: BootstrapClients =
            optional_env("BOOTSTRAP_CLIENTS").try_into()?;

        check_token_lifetimes(&access_token_lifetime, &refresh_token_lifetime)?;

        Ok(Self {
            version: version()?,
            http_port,
            external_base,
            storage_backend,
            database_url,
            auth_code_lifetime,
            access_token_lifetime,
            refresh_token_lifetime,
            cleanup_interval,
            auth_decision,
            bootstrap_clients,
        })
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn default_env(name: &str, default_value: &str) -> String {
    optional_env(name).unwrap_or_else(|| default_value.to_string())
}

fn parse_duration(value: String) -> Result<Duration> {
    duration_str::parse(&value)
        .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()).into())
}

fn parse_lifetime(value: String) -> Result<chrono::Duration> {
    Ok(chrono::Duration::from_std(parse_duration(value)?)?)
}

/// Access tokens must expire strictly before the refresh tokens minted with them
pub fn check_token_lifetimes(
    access: &AccessTokenLifetime,
    refresh: &RefreshTokenLifetime,
) -> std::result::Result<(), ConfigError> {
    if access.0 >= refresh.0 {
        return Err(ConfigError::InconsistentTokenLifetimes(
            access.0.to_string(),
            refresh.0.to_string(),
        ));
    }
    Ok(())
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for AuthCodeLifetime {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_lifetime(value)?))
    }
}

impl AsRef<chrono::Duration> for AuthCodeLifetime {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for AccessTokenLifetime {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_lifetime(value)?))
    }
}

impl AsRef<chrono::Duration> for AccessTokenLifetime {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for RefreshTokenLifetime {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_lifetime(value)?))
    }
}

impl AsRef<chrono::Duration> for RefreshTokenLifetime {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for CleanupInterval {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let interval = parse_duration(value.clone())?;
        if interval.is_zero() {
            return Err(ConfigError::DurationParsingFailed(
                value,
                "cleanup interval must be positive".to_string(),
            )
            .into());
        }
        Ok(Self(interval))
    }
}

impl AsRef<Duration> for CleanupInterval {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

impl AuthDecision {
    /// Build the decision mode from `AUTH_DECISION` and its companion settings
    pub fn from_parts(mode: &str, trusted_header: &str, fixed_user_id: &str) -> Result<Self> {
        match mode {
            "header" => {
                let header = HeaderName::from_bytes(trusted_header.as_bytes())
                    .map_err(|_| ConfigError::InvalidTrustedHeader(trusted_header.to_string()))?;
                Ok(Self::TrustedHeader(header))
            }
            "fixed" => Ok(Self::FixedUser(fixed_user_id.to_string())),
            other => Err(ConfigError::UnknownDecisionMode(other.to_string()).into()),
        }
    }

    pub fn decider(&self) -> Arc<dyn AuthenticationDecider> {
        match self {
            Self::TrustedHeader(header) => Arc::new(TrustedHeaderDecider::new(header.clone())),
            Self::FixedUser(user_id) => Arc::new(FixedUserDecider::new(user_id.clone())),
        }
    }
}

impl TryFrom<Option<String>> for BootstrapClients {
    type Error = anyhow::Error;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        let Some(value) = value else {
            return Ok(Self::default());
        };

        let clients = value
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                // The redirect domain contains ':' itself, so split at most twice
                let mut parts = entry.splitn(3, ':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(id), Some(secret), Some(domain))
                        if !id.is_empty() && !secret.is_empty() && !domain.is_empty() =>
                    {
                        Ok(BootstrapClient {
                            client_id: id.to_string(),
                            client_secret: secret.to_string(),
                            redirect_domain: domain.to_string(),
                        })
                    }
                    _ => Err(ConfigError::InvalidBootstrapClient(
                        entry.split(':').next().unwrap_or_default().to_string(),
                    )),
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self(clients))
    }
}

impl AsRef<Vec<BootstrapClient>> for BootstrapClients {
    fn as_ref(&self) -> &Vec<BootstrapClient> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_port() {
        let port: HttpPort = "9000".to_string().try_into().unwrap();
        assert_eq!(*port.as_ref(), 9000);
        let port: HttpPort = String::new().try_into().unwrap();
        assert_eq!(*port.as_ref(), 8080);
        assert!(HttpPort::try_from("http".to_string()).is_err());
    }

    #[test]
    fn test_lifetimes() {
        let code: AuthCodeLifetime = "10m".to_string().try_into().unwrap();
        assert_eq!(*code.as_ref(), chrono::Duration::minutes(10));

        let access: AccessTokenLifetime = "2h".to_string().try_into().unwrap();
        let refresh: RefreshTokenLifetime = "30d".to_string().try_into().unwrap();
        assert!(check_token_lifetimes(&access, &refresh).is_ok());

        let long_access: AccessTokenLifetime = "30d".to_string().try_into().unwrap();
        assert!(matches!(
            check_token_lifetimes(&long_access, &refresh),
            Err(ConfigError::InconsistentTokenLifetimes(_, _))
        ));

        let err = AccessTokenLifetime::try_from("soon".to_string()).err().unwrap();
        assert!(err.to_string().starts_with("error-authgate-config-4"));
    }

    #[test]
    fn test_cleanup_interval() {
        let interval: CleanupInterval = "5m".to_string().try_into().unwrap();
        assert_eq!(*interval.as_ref(), Duration::from_secs(300));
        assert!(CleanupInterval::try_from("0s".to_string()).is_err());
    }

    #[test]
    fn test_auth_decision() {
        assert_eq!(
            AuthDecision::from_parts("header", "x-authenticated-user", "demo-user").unwrap(),
            AuthDecision::TrustedHeader(HeaderName::from_static("x-authenticated-user"))
        );
        assert_eq!(
            AuthDecision::from_parts("fixed", "x-authenticated-user", "demo-user").unwrap(),
            AuthDecision::FixedUser("demo-user".to_string())
        );
        assert!(AuthDecision::from_parts("oidc", "x", "y").is_err());
        assert!(AuthDecision::from_parts("header", "bad header", "y").is_err());
    }

    #[test]
    fn test_bootstrap_clients() {
        let clients: BootstrapClients =
            Some("c1:s1:https://app/cb; c2:s2:http://localhost:9094 ;".to_string())
                .try_into()
                .unwrap();
        let clients = clients.as_ref();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].client_id, "c1");
        assert_eq!(clients[0].client_secret, "s1");
        assert_eq!(clients[0].redirect_domain, "https://app/cb");
        assert_eq!(clients[1].redirect_domain, "http://localhost:9094");

        let empty: BootstrapClients = None.try_into().unwrap();
        assert!(empty.as_ref().is_empty());

        let err = BootstrapClients::try_from(Some("c1:s1".to_string()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("c1"));
        assert!(!err.to_string().contains("s1"));
    }
}
