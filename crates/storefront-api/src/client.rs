//! Authenticated API client
//!
//! Composes store-scoped URLs (`{base}/{store_id}/{path}`), injects the
//! platform's `Authentication: bearer <token>` header and sends everything
//! through one shared [`RetryTransport`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::Secret;
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Method, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::backoff::RetryPolicy;
use crate::circuit::CircuitBreaker;
use crate::error::{ApiError, Result};
use crate::transport::{ApiRequest, HttpSend, RetryTransport};

pub const DEFAULT_BASE_URL: &str = "https://api.tiendanube.com/v1";

/// The API answers 400 to requests without a User-Agent.
pub const DEFAULT_USER_AGENT: &str = concat!("storefront-cli/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Not `Authorization`: the platform reads its own header name.
pub const AUTH_HEADER: HeaderName = HeaderName::from_static("authentication");

/// Query parameters as owned key/value pairs, in order.
pub type Query = Vec<(String, String)>;

/// Options for [`Client`].
pub struct ClientBuilder {
    store_id: String,
    access_token: Secret<String>,
    base_url: String,
    user_agent: String,
    timeout: Duration,
    policy: RetryPolicy,
    breaker: Option<Arc<CircuitBreaker>>,
    sender: Option<Arc<dyn HttpSend>>,
    cancel: Option<CancellationToken>,
}

impl ClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a breaker with other clients instead of creating a fresh one.
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Replace the default rustls `reqwest::Client`.
    pub fn sender(mut self, sender: Arc<dyn HttpSend>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<Client> {
        if self.store_id.is_empty() {
            return Err(ApiError::InvalidRequest("store id is empty".into()));
        }
        if self.access_token.is_empty() {
            return Err(ApiError::InvalidRequest("access token is empty".into()));
        }

        let root = api_root(&self.base_url, &self.store_id)?;

        let mut auth = HeaderValue::from_str(&format!("bearer {}", self.access_token.expose()))
            .map_err(|_| ApiError::InvalidRequest("access token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|_| ApiError::InvalidRequest("user agent is not a valid header value".into()))?;

        let sender: Arc<dyn HttpSend> = match self.sender {
            Some(sender) => sender,
            None => Arc::new(
                reqwest::Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| ApiError::InvalidRequest(format!("build HTTP client: {e}")))?,
            ),
        };
        let breaker = self.breaker.unwrap_or_default();

        let mut transport = RetryTransport::new(sender, breaker)
            .with_policy(self.policy)
            .with_timeout(self.timeout);
        if let Some(token) = self.cancel {
            transport = transport.with_cancellation(token);
        }

        Ok(Client {
            root,
            auth,
            user_agent,
            transport,
        })
    }
}

/// Store-scoped client. Cheap to clone; clones share the breaker.
#[derive(Clone)]
pub struct Client {
    root: Url,
    auth: HeaderValue,
    user_agent: HeaderValue,
    transport: RetryTransport,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("root", &self.root.as_str())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder(store_id: impl Into<String>, access_token: impl Into<Secret<String>>) -> ClientBuilder {
        ClientBuilder {
            store_id: store_id.into(),
            access_token: access_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            policy: RetryPolicy::default(),
            breaker: None,
            sender: None,
            cancel: None,
        }
    }

    /// `{base}/{store_id}/`, the prefix every request path is joined onto.
    pub fn root(&self) -> &Url {
        &self.root
    }

    pub fn transport(&self) -> &RetryTransport {
        &self.transport
    }

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Response> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let body = encode(body)?;
        self.request(Method::POST, path, &[], Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let body = encode(body)?;
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response> {
        self.request(Method::DELETE, path, &[], None).await
    }

    /// GET and decode the JSON body as `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> Result<T> {
        let response = self.get(path, query).await?;
        Self::decode(response).await
    }

    /// Send an arbitrary method with an already-encoded JSON body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<Bytes>,
    ) -> Result<Response> {
        let url = self.url(path, query)?;
        let mut request = ApiRequest::new(method, url)
            .header(AUTH_HEADER, self.auth.clone())
            .header(USER_AGENT, self.user_agent.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(body) = body {
            request = request.body(body);
        }
        self.transport.send(&request).await
    }

    /// Decode a JSON response body.
    pub async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Decode(format!("read body: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Split an absolute URL under [`Client::root`] back into a request path
    /// and query, so links returned by the API can be followed.
    pub fn relative_path(&self, url: &Url) -> Result<(String, Query)> {
        let rest = self
            .path_under_root(url)
            .ok_or_else(|| ApiError::InvalidRequest(format!("link {url} is outside {}", self.root)))?;

        let query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok((rest.to_string(), query))
    }

    /// The part of `url`'s path below the root, if `url` is on the root's
    /// origin and under its path.
    fn path_under_root<'a>(&self, url: &'a Url) -> Option<&'a str> {
        let same_origin = url.scheme() == self.root.scheme()
            && url.host_str() == self.root.host_str()
            && url.port_or_known_default() == self.root.port_or_known_default();
        url.path()
            .strip_prefix(self.root.path())
            .filter(|_| same_origin)
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = self
            .root
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidRequest(format!("invalid path {path:?}: {e}")))?;
        // Absolute URLs and `..` segments must not carry the token off the store.
        if self.path_under_root(&url).is_none() {
            return Err(ApiError::InvalidRequest(format!(
                "path {path:?} resolves outside {}",
                self.root
            )));
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

fn api_root(base_url: &str, store_id: &str) -> Result<Url> {
    let mut root = Url::parse(base_url)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid base URL {base_url:?}: {e}")))?;
    if !matches!(root.scheme(), "http" | "https") {
        return Err(ApiError::InvalidRequest(format!(
            "base URL must be http or https, got {base_url:?}"
        )));
    }
    let path = format!("{}/{}/", root.path().trim_end_matches('/'), store_id);
    root.set_path(&path);
    root.set_query(None);
    Ok(root)
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Bytes> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|e| ApiError::InvalidRequest(format!("encode body: {e}")))
}
