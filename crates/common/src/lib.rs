//! Shared types for the storefront workspace
//!
//! Holds the pieces every crate needs but none owns: the redacting `Secret`
//! wrapper used for access tokens and client secrets, and the configuration
//! error type used when loading TOML settings.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
