//! Loopback listener for the OAuth redirect
//!
//! Binds `127.0.0.1:<port>` and serves a single route, `/callback`. Every hit
//! is interpreted against the flow's mode and the verdict is offered to a
//! capacity-1 channel with `try_send`: the first verdict wins, later hits
//! still get an HTML page but never block the handler.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use common::Secret;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::constants::{CALLBACK_PATH, SHUTDOWN_GRACE};
use crate::error::{Error, Result};

/// What the listener expects to receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackMode {
    /// The broker redirects with `token` and `user_id`.
    Broker,
    /// The provider redirects with `code` and the `state` we sent.
    Native { state: String },
}

/// Token handed over by the broker.
#[derive(Debug, Clone)]
pub struct BrokerToken {
    pub access_token: Secret<String>,
    pub user_id: String,
}

/// A successful callback.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    Code(String),
    Token(BrokerToken),
}

/// Decide what a callback with these query parameters means.
pub fn interpret_callback(
    mode: &CallbackMode,
    params: &HashMap<String, String>,
) -> Result<CallbackOutcome> {
    let param = |name: &str| query_value(params, name);

    let provider_error = param("error");
    if !provider_error.is_empty() {
        let description = param("error_description");
        return Err(Error::Provider(if description.is_empty() {
            provider_error.to_string()
        } else {
            format!("{provider_error}: {description}")
        }));
    }

    match mode {
        CallbackMode::Native { state } => {
            if param("state") != state.as_str() {
                return Err(Error::StateMismatch);
            }
            let code = param("code");
            if code.is_empty() {
                return Err(Error::MissingCode);
            }
            Ok(CallbackOutcome::Code(code.to_string()))
        }
        CallbackMode::Broker => {
            let token = param("token");
            let user_id = param("user_id");
            if token.is_empty() || user_id.is_empty() {
                return Err(Error::MissingToken);
            }
            Ok(CallbackOutcome::Token(BrokerToken {
                access_token: Secret::from(token),
                user_id: user_id.to_string(),
            }))
        }
    }
}

fn query_value<'a>(params: &'a HashMap<String, String>, name: &str) -> &'a str {
    params.get(name).map(String::as_str).unwrap_or("")
}

struct CallbackState {
    mode: CallbackMode,
    tx: mpsc::Sender<Result<CallbackOutcome>>,
}

/// Router serving `/callback`; verdicts go to `tx`.
pub fn router(mode: CallbackMode, tx: mpsc::Sender<Result<CallbackOutcome>>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(Arc::new(CallbackState { mode, tx }))
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    let verdict = interpret_callback(&state.mode, &params);

    let page = match &verdict {
        Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE)),
        Err(Error::Provider(_)) => (StatusCode::OK, Html(FAILURE_PAGE)),
        Err(_) => (StatusCode::BAD_REQUEST, Html(INVALID_PAGE)),
    };

    if let Err(e) = &verdict {
        warn!(error = %e, "rejected authorization callback");
    }
    if state.tx.try_send(verdict).is_err() {
        debug!("authorization callback already received, ignoring");
    }

    page
}

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this window.</p></body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>You can close this window.</p></body>
</html>"#;

const INVALID_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Invalid or unexpected callback parameters. Please try again.</p></body>
</html>"#;

/// Running loopback listener for one authorization attempt.
pub struct CallbackServer {
    addr: SocketAddr,
    rx: mpsc::Receiver<Result<CallbackOutcome>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind `127.0.0.1:port` (0 picks an ephemeral port) and start serving.
    pub async fn bind(port: u16, mode: CallbackMode) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| Error::Bind {
                port,
                message: e.to_string(),
            })?;
        let addr = listener.local_addr().map_err(|e| Error::Bind {
            port,
            message: e.to_string(),
        })?;

        let (tx, rx) = mpsc::channel(1);
        let app = router(mode, tx);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!(error = %e, "callback listener failed");
            }
        });

        debug!(%addr, "callback listener started");
        Ok(Self {
            addr,
            rx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// `http://127.0.0.1:<port>/callback`
    pub fn redirect_uri(&self) -> String {
        format!("http://{}{CALLBACK_PATH}", self.addr)
    }

    /// Wait for the first callback verdict.
    pub async fn recv(&mut self) -> Result<CallbackOutcome> {
        match self.rx.recv().await {
            Some(verdict) => verdict,
            None => Err(Error::Io("callback listener stopped".into())),
        }
    }

    /// Stop serving and release the port. Connections get `SHUTDOWN_GRACE`
    /// to drain before the task is aborted.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("callback listener did not drain in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
        debug!(addr = %self.addr, "callback listener stopped");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
