//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The access token is read from STOREFRONT_ACCESS_TOKEN or
//! `access_token_file`, never stored in the TOML directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use serde::Deserialize;

pub const ENV_CONFIG: &str = "STOREFRONT_CONFIG";
pub const ENV_ACCESS_TOKEN: &str = "STOREFRONT_ACCESS_TOKEN";
pub const ENV_STORE_ID: &str = "STOREFRONT_STORE_ID";
pub const ENV_AUTH_BROKER: &str = "STOREFRONT_AUTH_BROKER";

const DEFAULT_CONFIG_FILE: &str = "storefront.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
}

/// API client settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub store_id: Option<String>,
    /// Path to a file containing the access token (alternative to the env var)
    pub access_token_file: Option<PathBuf>,
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: storefront_api::DEFAULT_BASE_URL.to_string(),
            user_agent: storefront_api::DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            store_id: None,
            access_token_file: None,
            access_token: None,
        }
    }
}

/// Authorization flow settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Broker used when no client credentials are configured.
    pub broker_url: Option<String>,
    /// Broker requested explicitly (STOREFRONT_AUTH_BROKER or --broker-url);
    /// skips credential loading.
    #[serde(skip)]
    pub explicit_broker_url: Option<String>,
    pub callback_port: u16,
    pub timeout_secs: u64,
    pub credentials_file: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            broker_url: None,
            explicit_broker_url: None,
            callback_port: storefront_auth::CALLBACK_PORT,
            timeout_secs: storefront_auth::DEFAULT_TIMEOUT.as_secs(),
            credentials_file: default_config_dir().join("credentials.json"),
        }
    }
}

/// Values given on the command line; `None` leaves lower layers in place.
#[derive(Debug, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub store_id: Option<String>,
    pub broker_url: Option<String>,
    pub callback_port: Option<u16>,
    pub auth_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Access token resolution order:
    /// 1. STOREFRONT_ACCESS_TOKEN env var
    /// 2. access_token_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        if !path.exists() {
            return Err(common::Error::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields defaults unless the
    /// path was asked for explicitly.
    pub fn load_or_default(path: &Path, explicit: bool) -> common::Result<Self> {
        if !explicit && !path.exists() {
            let mut config = Config::default();
            config.apply_env()?;
            return Ok(config);
        }
        Self::load(path)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Some(store_id) = non_empty_env(ENV_STORE_ID) {
            self.api.store_id = Some(store_id);
        }
        if let Some(broker) = non_empty_env(ENV_AUTH_BROKER) {
            self.auth.explicit_broker_url = Some(broker);
        }

        if let Some(token) = non_empty_env(ENV_ACCESS_TOKEN) {
            self.api.access_token = Some(Secret::new(token));
        } else if let Some(ref token_file) = self.api.access_token_file {
            let token = std::fs::read_to_string(token_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read access_token_file {}: {e}",
                    token_file.display()
                ))
            })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                self.api.access_token = Some(Secret::new(token));
            }
        }
        Ok(())
    }

    /// Apply command-line values, then validate the result.
    pub fn apply_overrides(&mut self, overrides: Overrides) -> common::Result<()> {
        if let Some(base_url) = overrides.base_url {
            self.api.base_url = base_url;
        }
        if let Some(store_id) = overrides.store_id {
            self.api.store_id = Some(store_id);
        }
        if let Some(broker) = overrides.broker_url {
            self.auth.explicit_broker_url = Some(broker);
        }
        if let Some(port) = overrides.callback_port {
            self.auth.callback_port = port;
        }
        if let Some(secs) = overrides.auth_timeout_secs {
            self.auth.timeout_secs = secs;
        }
        self.validate()
    }

    pub fn validate(&self) -> common::Result<()> {
        require_http("api.base_url", &self.api.base_url)?;
        for (name, url) in [
            ("auth.broker_url", &self.auth.broker_url),
            ("broker URL", &self.auth.explicit_broker_url),
        ] {
            if let Some(url) = url {
                require_http(name, url)?;
            }
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.auth.timeout_secs == 0 {
            return Err(common::Error::Config(
                "auth.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.auth.callback_port == 0 {
            return Err(common::Error::Config(
                "auth.callback_port must be greater than 0".into(),
            ));
        }
        if self.api.user_agent.trim().is_empty() {
            return Err(common::Error::Config("api.user_agent must not be empty".into()));
        }
        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.timeout_secs)
    }

    /// Resolve config file path from CLI arg or STOREFRONT_CONFIG env var.
    /// The flag reports whether the path was chosen explicitly.
    pub fn resolve_path(cli_path: Option<&Path>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (p.to_path_buf(), true);
        }
        if let Some(p) = non_empty_env(ENV_CONFIG) {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }
}

fn require_http(name: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {url}"
        )))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// `$XDG_CONFIG_HOME/storefront`, falling back to `~/.config/storefront`
/// (or `%APPDATA%\storefront`), then the working directory.
fn default_config_dir() -> PathBuf {
    if let Some(dir) = non_empty_env("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join("storefront");
    }
    if cfg!(windows) {
        if let Some(dir) = non_empty_env("APPDATA") {
            return PathBuf::from(dir).join("storefront");
        }
    }
    if let Some(home) = non_empty_env("HOME") {
        return PathBuf::from(home).join(".config").join("storefront");
    }
    PathBuf::from(".")
}
