//! authgate library crate.
//!
//! Provides an OAuth 2 authorization-code server core: client registry, code
//! and token stores, the grant engine, and bearer token validation.

pub mod config;
pub mod errors;
pub mod http;
pub mod oauth;
pub mod storage;
