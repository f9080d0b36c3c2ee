//! Storefront OAuth authorization
//!
//! Obtains an access token for the CLI through a loopback redirect. Two
//! variants share the same listener:
//!
//! - broker: a remote service holds the app secret, runs the provider flow
//!   and redirects to `http://127.0.0.1:<port>/callback?token=..&user_id=..`
//! - native: the CLI holds `client_id`/`client_secret`, receives `code` +
//!   `state` on the callback and calls `token::exchange_code()` itself
//!
//! `AuthorizationFlow::run()` picks the variant, opens the browser and
//! returns a `TokenResult`. Persisting the token is left to the caller.

pub mod browser;
pub mod callback;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod state;
pub mod token;

pub use browser::{BrowserLauncher, SystemBrowser};
pub use callback::{CallbackMode, CallbackOutcome, CallbackServer};
pub use constants::*;
pub use credentials::{ClientCredentials, CredentialSource, FileCredentialSource};
pub use error::{Error, Result};
pub use flow::{AuthorizationFlow, FlowKind, FlowOptions, ProviderEndpoints};
pub use state::generate_state;
pub use token::{TokenResult, exchange_code, extract_code};
