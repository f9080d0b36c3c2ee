//! Command handlers
//!
//! Results go to `out` (stdout in the binary); prompts and URLs go to stderr
//! so the output stays pipeable.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use reqwest::{Method, Response};
use serde_json::Value;
use storefront_api::{ApiError, Client, collect_all_json};
use storefront_auth::{
    AuthorizationFlow, BrowserLauncher, CredentialSource, FileCredentialSource, FlowOptions,
    SystemBrowser, TokenResult,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::{ApiCommand, AuthCommand, BodyArgs, Cli, Command, LoginArgs};
use crate::config::{ENV_ACCESS_TOKEN, ENV_STORE_ID, Config, Overrides};
use crate::exit::{self, UsageError};

/// Execute the parsed command line.
pub async fn run(cli: Cli, cancel: CancellationToken, out: &mut impl Write) -> anyhow::Result<()> {
    if let Command::ExitCodes { json } = cli.command {
        exit::print_table(out, json)?;
        return Ok(());
    }

    let mut overrides = Overrides {
        base_url: cli.base_url,
        store_id: cli.store_id,
        ..Overrides::default()
    };
    if let Command::Auth(AuthCommand::Login(args)) = &cli.command {
        overrides.broker_url = args.broker_url.clone();
        overrides.callback_port = args.port;
        overrides.auth_timeout_secs = args.timeout;
    }

    let (path, explicit) = Config::resolve_path(cli.config.as_deref());
    debug!(path = %path.display(), explicit, "loading configuration");
    let mut config = Config::load_or_default(&path, explicit)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.apply_overrides(overrides)?;

    match cli.command {
        Command::Api(command) => api(&config, command, cancel, out).await,
        Command::Auth(AuthCommand::Login(args)) => login(&config, args, cancel, out).await,
        Command::Auth(AuthCommand::Credentials { file }) => install_credentials(&config, &file).await,
        Command::ExitCodes { .. } => Ok(()),
    }
}

/// Build an API client from the resolved configuration.
pub fn build_client(config: &Config, cancel: CancellationToken) -> anyhow::Result<Client> {
    let store_id = config.api.store_id.as_deref().ok_or_else(|| {
        common::Error::Config(format!(
            "no store id: set {ENV_STORE_ID}, api.store_id or pass --store-id"
        ))
    })?;
    let token = config.api.access_token.clone().ok_or_else(|| {
        common::Error::Config(format!(
            "no access token: set {ENV_ACCESS_TOKEN} or api.access_token_file, \
             or run `storefront auth login`"
        ))
    })?;

    let client = Client::builder(store_id, token)
        .base_url(config.api.base_url.as_str())
        .user_agent(config.api.user_agent.as_str())
        .timeout(config.api_timeout())
        .cancellation(cancel)
        .build()?;
    Ok(client)
}

async fn api(
    config: &Config,
    command: ApiCommand,
    cancel: CancellationToken,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let client = build_client(config, cancel.clone())?;

    match command {
        ApiCommand::Get { path, query, all: true } => {
            let items = collect_all_json::<Value>(&client, &path, &query).await?;
            info!(path = %path, items = items.len(), "collected all pages");
            write_json(out, &Value::Array(items))
        }
        ApiCommand::Get { path, query, all: false } => {
            let response = client.get(&path, &query).await?;
            print_response(response, out).await
        }
        ApiCommand::Post(args) => send_body(&client, Method::POST, args, &cancel, out).await,
        ApiCommand::Put(args) => send_body(&client, Method::PUT, args, &cancel, out).await,
        ApiCommand::Delete { path } => {
            let response = client.delete(&path).await?;
            print_response(response, out).await
        }
    }
}

async fn send_body(
    client: &Client,
    method: Method,
    args: BodyArgs,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let body = read_body(&args.data, tokio::io::stdin(), cancel).await?;
    let response = client.request(method, &args.path, &[], Some(body)).await?;
    print_response(response, out).await
}

/// Resolve `--data`: inline JSON, `@file`, or `-` for `stdin`. The body must
/// be valid JSON and is re-encoded compactly. Reading `stdin` stops on
/// cancellation.
async fn read_body(
    data: &str,
    mut stdin: impl AsyncRead + Unpin,
    cancel: &CancellationToken,
) -> anyhow::Result<Bytes> {
    let raw = if data == "-" {
        let mut buf = String::new();
        tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled.into()),
            read = stdin.read_to_string(&mut buf) => {
                read.context("failed to read body from stdin")?;
            }
        }
        buf
    } else if let Some(file) = data.strip_prefix('@') {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("failed to read body from {file}"))?
    } else {
        data.to_string()
    };

    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| UsageError(format!("--data is not valid JSON: {e}")))?;
    Ok(Bytes::from(serde_json::to_vec(&value)?))
}

/// Print a JSON body pretty, any other body as-is, an empty body not at all.
async fn print_response(response: Response, out: &mut impl Write) -> anyhow::Result<()> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::Decode(format!("read body: {e}")))?;
    debug!(status = status.as_u16(), bytes = body.len(), "response received");
    if body.is_empty() {
        return Ok(());
    }

    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => write_json(out, &value),
        Err(_) => {
            out.write_all(&body)?;
            writeln!(out)?;
            Ok(())
        }
    }
}

fn write_json(out: &mut impl Write, value: &Value) -> anyhow::Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Shows the authorize URL on stderr before handing it to the browser, so
/// it can be opened by hand on headless machines.
struct PrintingLauncher<B> {
    inner: B,
}

impl<B: BrowserLauncher> BrowserLauncher for PrintingLauncher<B> {
    fn open(&self, url: &str) -> io::Result<()> {
        eprintln!("Opening the authorization page in your browser:\n  {url}");
        self.inner.open(url)
    }
}

async fn login(
    config: &Config,
    args: LoginArgs,
    cancel: CancellationToken,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .user_agent(config.api.user_agent.as_str())
        .build()
        .context("failed to build HTTP client")?;
    let flow = AuthorizationFlow::new(
        Arc::new(FileCredentialSource::new(&config.auth.credentials_file)),
        Arc::new(PrintingLauncher { inner: SystemBrowser }),
    )
    .with_http_client(http);
    let options = FlowOptions {
        broker_url: config.auth.explicit_broker_url.clone(),
        default_broker_url: config.auth.broker_url.clone(),
        callback_port: config.auth.callback_port,
        timeout: config.auth_timeout(),
        cancel: Some(cancel.clone()),
    };

    let token = if args.manual {
        let url = flow.manual_authorize_url().await?;
        eprintln!("Open this URL, authorize the app, then paste the redirect URL or code:\n  {url}");
        let input = read_line(&cancel).await?;
        flow.complete_manual(&input, &options).await?
    } else {
        flow.run(options).await?
    };

    write_json(out, &token_json(&token))?;
    eprintln!("Authorized store {}. Export the token as {ENV_ACCESS_TOKEN}.", token.account_id);
    Ok(())
}

async fn read_line(cancel: &CancellationToken) -> anyhow::Result<String> {
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    let read = tokio::select! {
        _ = cancel.cancelled() => return Err(storefront_auth::Error::Cancelled.into()),
        read = stdin.read_line(&mut line) => read.context("failed to read from stdin")?,
    };
    if read == 0 {
        return Err(storefront_auth::Error::Cancelled.into());
    }
    Ok(line)
}

fn token_json(token: &TokenResult) -> Value {
    serde_json::json!({
        "access_token": token.access_token.expose(),
        "token_type": token.token_type,
        "scope": token.scope,
        "user_id": token.account_id,
    })
}

async fn install_credentials(config: &Config, file: &Path) -> anyhow::Result<()> {
    if tokio::fs::metadata(file).await.is_err() {
        return Err(common::Error::NotFound(file.to_path_buf()).into());
    }
    let credentials = FileCredentialSource::new(file)
        .load()
        .await
        .with_context(|| format!("invalid credentials file {}", file.display()))?;

    let target = FileCredentialSource::new(&config.auth.credentials_file);
    target.save(&credentials).await?;
    info!(path = %target.path().display(), client_id = %credentials.client_id, "credentials saved");
    eprintln!("Credentials saved to {}", target.path().display());
    Ok(())
}
