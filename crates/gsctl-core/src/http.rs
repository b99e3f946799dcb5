//! Minimal JSON-over-HTTP/1.1 client.
//!
//! Used for the cluster API (through an API proxy) and for event
//! webhooks. Each request opens a fresh connection, performs the hyper
//! handshake and drives the connection in the background, so the client
//! is `Clone` and holds no pooled state.

use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Errors raised by [`JsonClient`].
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid base url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build request: {0}")]
    Request(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response body: {0}")]
    Decode(String),
}

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl JsonResponse {
    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Decode(e.to_string()))
    }

    /// Body as lossy UTF-8, for error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// JSON HTTP client bound to a base URL (`http://host:port[/prefix]`).
#[derive(Debug, Clone)]
pub struct JsonClient {
    authority: String,
    prefix: String,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl JsonClient {
    /// Create a client for the given base URL. Only plain `http` is supported.
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        let uri: Uri = base_url.parse().map_err(|e: http::uri::InvalidUri| {
            HttpError::InvalidUrl {
                url: base_url.to_string(),
                reason: e.to_string(),
            }
        })?;

        if uri.scheme_str() != Some("http") {
            return Err(HttpError::InvalidUrl {
                url: base_url.to_string(),
                reason: "only http:// endpoints are supported".to_string(),
            });
        }

        let authority = uri
            .authority()
            .ok_or_else(|| HttpError::InvalidUrl {
                url: base_url.to_string(),
                reason: "missing host".to_string(),
            })?;
        let authority = if authority.port().is_some() {
            authority.to_string()
        } else {
            format!("{}:80", authority.host())
        };

        Ok(Self {
            authority,
            prefix: uri.path().trim_end_matches('/').to_string(),
            bearer_token: None,
            timeout: Duration::from_secs(5),
        })
    }

    /// Attach a bearer token to every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the per-request timeout (connect + exchange).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `host:port` this client connects to.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub async fn get(&self, path: &str) -> Result<JsonResponse, HttpError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<JsonResponse, HttpError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<JsonResponse, HttpError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<JsonResponse, HttpError> {
        self.send(Method::DELETE, path, None).await
    }

    /// Send a request and buffer the full response.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<JsonResponse, HttpError> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.exchange(method, path, body)).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::Timeout(timeout)),
        }
    }

    async fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<JsonResponse, HttpError> {
        let uri = format!("http://{}{}{}", self.authority, self.prefix, path);

        let payload = match body {
            Some(value) => {
                Bytes::from(serde_json::to_vec(value).map_err(|e| HttpError::Request(e.to_string()))?)
            }
            None => Bytes::new(),
        };

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(HOST, self.authority.as_str())
            .header(USER_AGENT, "gsctl/0.1");
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        if let Some(token) = &self.bearer_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = builder
            .body(Full::new(payload))
            .map_err(|e| HttpError::Request(e.to_string()))?;

        let stream = tokio::net::TcpStream::connect(self.authority.as_str())
            .await
            .map_err(|e| HttpError::Connect(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HttpError::Connect(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?
            .to_bytes();

        debug!(%method, %uri, %status, "http exchange complete");
        Ok(JsonResponse { status, body })
    }
}
