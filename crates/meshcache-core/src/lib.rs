//! meshcache-core — shared types, wire formats, and configuration.
//! All other meshcache crates depend on this one.

pub mod config;
pub mod retry;
pub mod url;
pub mod wire;

pub use url::ParsedUrl;
