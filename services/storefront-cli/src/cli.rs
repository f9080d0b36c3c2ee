//! Command-line surface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "storefront", version, about = "Storefront API command-line client")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: $STOREFRONT_CONFIG or ./storefront.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Store to act on (overrides STOREFRONT_STORE_ID and the config file)
    #[arg(long, global = true, value_name = "ID")]
    pub store_id: Option<String>,

    /// API root, e.g. https://api.tiendanube.com/v1
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Obtain and manage credentials
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Raw API requests; responses are printed as JSON
    #[command(subcommand)]
    Api(ApiCommand),
    /// Print the exit code table
    ExitCodes {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authorize in the browser and print the access token
    Login(LoginArgs),
    /// Install OAuth client credentials from a JSON file
    Credentials {
        /// File with {"client_id": "...", "client_secret": "..."}
        file: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Authorize through this broker instead of local credentials
    #[arg(long, value_name = "URL")]
    pub broker_url: Option<String>,

    /// Seconds to wait for the browser round-trip
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Loopback port for the redirect
    #[arg(long)]
    pub port: Option<u16>,

    /// Print the authorize URL and read the redirect URL or code from stdin
    #[arg(long, conflicts_with = "broker_url")]
    pub manual: bool,
}

#[derive(Debug, Subcommand)]
pub enum ApiCommand {
    /// GET a resource, e.g. `products` or `orders/123`
    Get {
        path: String,
        /// Query parameter, repeatable
        #[arg(short = 'q', long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
        /// Follow `Link: rel="next"` and print every item as one array
        #[arg(long)]
        all: bool,
    },
    /// POST a JSON body
    Post(BodyArgs),
    /// PUT a JSON body
    Put(BodyArgs),
    /// DELETE a resource
    Delete {
        path: String,
    },
}

#[derive(Debug, Args)]
pub struct BodyArgs {
    pub path: String,
    /// JSON body, `@file`, or `-` for stdin
    #[arg(short, long, value_name = "JSON")]
    pub data: String,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}
