//! In-memory storage implementations
//!
//! Backed by sharded concurrent maps so the atomic code and refresh-token
//! operations lock a single shard, never the whole store. Suitable for
//! development, tests and single-instance deployments that can lose state on
//! restart.

mod oauth;

pub use oauth::MemoryOAuthStorage;
