//! OAuth client management.
//!
//! Clients are registered out of band (bootstrap configuration or the
//! management CLI) and only read during grant processing.

pub mod registry;

pub use registry::ClientRegistry;
