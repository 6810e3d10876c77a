//! HTTP surface tests for the authorize, token, revoke and protected API routes.

use authgate::config::{AuthDecision, Config};
use authgate::http::{AppState, build_router};
use authgate::oauth::{AuthenticationDecider, TrustedHeaderDecider};
use authgate::storage::{OAuthStorage, inmemory::MemoryOAuthStorage};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::TestServer;
use base64::prelude::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

const CLIENT_ID: &str = "c1";
const CLIENT_SECRET: &str = "s1";
const REDIRECT_URI: &str = "https://app/cb";
const USER_HEADER: &str = "x-authenticated-user";
// Credentials that need form-urlencoding inside a Basic header
const RESERVED_CLIENT_ID: &str = "c:2";
const RESERVED_CLIENT_SECRET: &str = "s:1 &x";

async fn test_server() -> TestServer {
    let header_name = HeaderName::from_static(USER_HEADER);
    let config = Arc::new(Config {
        version: "test".to_string(),
        http_port: "8080".to_string().try_into().unwrap(),
        external_base: "http://localhost:8080".to_string(),
        storage_backend: "memory".to_string(),
        database_url: None,
        auth_code_lifetime: "10m".to_string().try_into().unwrap(),
        access_token_lifetime: "2h".to_string().try_into().unwrap(),
        refresh_token_lifetime: "30d".to_string().try_into().unwrap(),
        cleanup_interval: "5m".to_string().try_into().unwrap(),
        auth_decision: AuthDecision::TrustedHeader(header_name.clone()),
        bootstrap_clients: Default::default(),
    });
    let storage: Arc<dyn OAuthStorage> = Arc::new(MemoryOAuthStorage::new());
    let decider: Arc<dyn AuthenticationDecider> = Arc::new(TrustedHeaderDecider::new(header_name));

    let state = AppState::new(config, storage, decider);
    state
        .grant_engine
        .clients()
        .register(CLIENT_ID, CLIENT_SECRET, REDIRECT_URI, None)
        .await
        .unwrap();
    state
        .grant_engine
        .clients()
        .register(RESERVED_CLIENT_ID, RESERVED_CLIENT_SECRET, REDIRECT_URI, None)
        .await
        .unwrap();

    TestServer::new(build_router(state)).unwrap()
}

fn authorize_url(client_id: &str, redirect_uri: &str) -> String {
    let mut url = Url::parse("http://localhost/authorize").unwrap();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", "read write")
        .append_pair("state", "xyz");
    format!("{}?{}", url.path(), url.query().unwrap_or_default())
}

fn redirect_params(location: &str) -> HashMap<String, String> {
    Url::parse(location)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

fn user_header(user: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(USER_HEADER),
        HeaderValue::from_static(user),
    )
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

async fn obtain_code(server: &TestServer) -> String {
    obtain_code_for(server, CLIENT_ID).await
}

async fn obtain_code_for(server: &TestServer, client_id: &str) -> String {
    let (name, value) = user_header("alice");
    let response = server
        .get(&authorize_url(client_id, REDIRECT_URI))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    let location = response.header(header::LOCATION);
    let params = redirect_params(location.to_str().unwrap());
    params["code"].clone()
}

async fn obtain_tokens(server: &TestServer) -> Value {
    let code = obtain_code(server).await;
    let response = server
        .post("/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json::<Value>()
}

#[tokio::test]
async fn test_health() {
    let server = test_server().await;
    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_callback_echoes_code() {
    let server = test_server().await;
    let response = server.get("/callback?code=abc").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["message"], "Received authorization code");
    assert_eq!(body["code"], "abc");
}

#[tokio::test]
async fn test_authorize_redirects_with_code_and_state() {
    let server = test_server().await;
    let (name, value) = user_header("alice");
    let response = server
        .get(&authorize_url(CLIENT_ID, REDIRECT_URI))
        .add_header(name, value)
        .await;

    assert_eq!(response.status_code(), StatusCode::FOUND);
    let location = response.header(header::LOCATION);
    let location = location.to_str().unwrap();
    assert!(location.starts_with("https://app/cb?"));
    let params = redirect_params(location);
    assert!(!params["code"].is_empty());
    assert_eq!(params["state"], "xyz");
}

#[tokio::test]
async fn test_authorize_without_user_redirects_access_denied() {
    let server = test_server().await;
    let response = server.get(&authorize_url(CLIENT_ID, REDIRECT_URI)).await;

    assert_eq!(response.status_code(), StatusCode::FOUND);
    let location = response.header(header::LOCATION);
    let params = redirect_params(location.to_str().unwrap());
    assert_eq!(params["error"], "access_denied");
    assert_eq!(params["state"], "xyz");
    assert!(!params.contains_key("code"));
}

#[tokio::test]
async fn test_authorize_errors_are_not_redirected() {
    let server = test_server().await;
    let (name, value) = user_header("alice");

    let response = server
        .get(&authorize_url("nobody", REDIRECT_URI))
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(response.maybe_header(header::LOCATION).is_none());
    assert_eq!(response.json::<Value>()["error"], "invalid_request");

    let response = server
        .get(&authorize_url(CLIENT_ID, "https://evil.example/cb"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(response.maybe_header(header::LOCATION).is_none());
    assert_eq!(response.json::<Value>()["error"], "invalid_request");
}

#[tokio::test]
async fn test_token_exchange_and_replay() {
    let server = test_server().await;
    let code = obtain_code(&server).await;
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", REDIRECT_URI),
        ("client_id", CLIENT_ID),
        ("client_secret", CLIENT_SECRET),
    ];

    let response = server.post("/token").form(&form).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.header(header::CACHE_CONTROL), "no-store");
    let body = response.json::<Value>();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["scope"], "read write");
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
    assert!(body["expires_in"].as_u64().unwrap() > 0);

    let replay = server.post("/token").form(&form).await;
    assert_eq!(replay.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(replay.header(header::CACHE_CONTROL), "no-store");
    assert_eq!(replay.json::<Value>()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_token_with_basic_auth() {
    let server = test_server().await;
    let code = obtain_code(&server).await;
    let credentials = BASE64_STANDARD.encode(format!("{}:{}", CLIENT_ID, CLIENT_SECRET));

    let response = server
        .post("/token")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", credentials)).unwrap(),
        )
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_with_form_encoded_basic_auth() {
    let server = test_server().await;
    let code = obtain_code_for(&server, RESERVED_CLIENT_ID).await;
    let credentials = BASE64_STANDARD.encode("c%3A2:s%3A1+%26x");

    let response = server
        .post("/token")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", credentials)).unwrap(),
        )
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_over_get_is_not_allowed() {
    let server = test_server().await;
    let code = obtain_code(&server).await;
    let response = server
        .get(&format!(
            "/token?grant_type=authorization_code&code={}&redirect_uri=https%3A%2F%2Fapp%2Fcb&client_id={}&client_secret={}",
            code, CLIENT_ID, CLIENT_SECRET
        ))
        .await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);

    // The code is still redeemable over POST
    let response = server
        .post("/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_with_bad_secret() {
    let server = test_server().await;
    let code = obtain_code(&server).await;

    let response = server
        .post("/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("client_secret", "wrong"),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert!(response.maybe_header(header::WWW_AUTHENTICATE).is_some());
    assert_eq!(response.json::<Value>()["error"], "invalid_client");
}

#[tokio::test]
async fn test_token_with_unsupported_grant_type() {
    let server = test_server().await;
    let response = server
        .post("/token")
        .form(&[
            ("grant_type", "password"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_refresh_over_http() {
    let server = test_server().await;
    let tokens = obtain_tokens(&server).await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", CLIENT_ID),
        ("client_secret", CLIENT_SECRET),
    ];
    let response = server.post("/token").form(&form).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let rotated = response.json::<Value>();
    assert_ne!(rotated["refresh_token"], tokens["refresh_token"]);

    let reuse = server.post("/token").form(&form).await;
    assert_eq!(reuse.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(reuse.json::<Value>()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_hello_api_requires_valid_bearer() {
    let server = test_server().await;

    let response = server.get("/hello").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let challenge = response.header(header::WWW_AUTHENTICATE);
    assert!(challenge.to_str().unwrap().starts_with("Bearer"));

    let response = server
        .get("/hello")
        .add_header(header::AUTHORIZATION, bearer("not-a-real-token"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "invalid_token");

    let tokens = obtain_tokens(&server).await;
    let access_token = tokens["access_token"].as_str().unwrap();
    let response = server
        .get("/hello")
        .add_header(header::AUTHORIZATION, bearer(access_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["user"], "alice");
    assert_eq!(body["client_id"], CLIENT_ID);
    assert_eq!(body["message"], "Hello, alice");
}

#[tokio::test]
async fn test_revoke_then_access_is_rejected() {
    let server = test_server().await;
    let tokens = obtain_tokens(&server).await;
    let access_token = tokens["access_token"].as_str().unwrap();
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    let response = server
        .post("/revoke")
        .form(&[
            ("token", refresh_token),
            ("token_type_hint", "refresh_token"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .get("/hello")
        .add_header(header::AUTHORIZATION, bearer(access_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "invalid_token");

    // Unknown tokens are accepted without error
    let response = server
        .post("/revoke")
        .form(&[
            ("token", "unknown"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}
