//! Platform OAuth endpoints and flow defaults
//!
//! The authorize page is per-application: `{AUTHORIZE_BASE_URL}/{client_id}/authorize`.
//! None of these values are secrets.

use std::time::Duration;

pub const AUTHORIZE_BASE_URL: &str = "https://www.tiendanube.com/apps";

/// Token endpoint for the authorization-code exchange.
pub const TOKEN_ENDPOINT: &str = "https://www.tiendanube.com/apps/authorize/token";

/// Loopback port the callback listener binds. Registered with the app and
/// the broker, so it cannot be ephemeral.
pub const CALLBACK_PORT: u16 = 8484;

pub const CALLBACK_PATH: &str = "/callback";

/// Overall budget for one authorization attempt, callback and exchange included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long the listener may drain connections before it is aborted.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
