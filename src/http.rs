//! Bounded HTTP/JSON requests.
//!
//! [`HttpClient::request_json`] sends one request and decodes the response
//! body as JSON. The whole exchange (connect, send, read body) runs under a
//! single deadline; when it expires the in-flight future is dropped, which
//! aborts the underlying connection instead of letting it finish in the
//! background.
//!
//! TCP endpoints go through `reqwest`. Unix socket endpoints are driven with a
//! plain hyper HTTP/1 connection. `https` URLs need the `tls` feature; without
//! it they are rejected rather than downgraded.

use crate::path::AbsolutePath;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UnixStream;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request took longer than {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("HTTPS requested but not supported by this build")]
    TlsUnavailable,

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

/// One JSON request. Header names are matched case-insensitively; caller
/// supplied headers override the defaults.
#[derive(Debug, Clone)]
pub struct JsonRequest {
    pub url: String,
    pub method: hyper::Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub socket: Option<AbsolutePath>,
}

impl JsonRequest {
    pub fn new(method: hyper::Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: None,
            socket: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(hyper::Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(hyper::Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: &Value) -> Self {
        self.body = Some(body.to_string().into_bytes());
        self
    }

    /// Route the request through a Unix socket. The URL still supplies the
    /// path, query and `Host` header.
    pub fn via_socket(mut self, socket: Option<AbsolutePath>) -> Self {
        self.socket = socket;
        self
    }

    fn with_defaults(mut self) -> Self {
        let defaults = [
            ("Content-Type", "application/json".to_string()),
            (
                "User-Agent",
                format!("docker-xylem/{}", env!("CARGO_PKG_VERSION")),
            ),
        ];
        for (name, value) in defaults {
            if !self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name)) {
                self.headers.push((name.to_string(), value));
            }
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    timeout: Duration,
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: impl Into<Duration>) -> Result<Self, ClientError> {
        // Deadlines are enforced around the whole exchange in request_json.
        let inner = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            timeout: timeout.into(),
            inner,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn request_json(&self, req: JsonRequest) -> Result<Value, ClientError> {
        let req = req.with_defaults();
        let url = Url::parse(&req.url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        if req.socket.is_none() && url.scheme() == "https" && !cfg!(feature = "tls") {
            tracing::error!(url = %url, "HTTPS requested but not supported");
            return Err(ClientError::TlsUnavailable);
        }

        debug!(method = %req.method, url = %url, socket = ?req.socket, "sending request");

        let exchange = async {
            match &req.socket {
                Some(socket) => self.send_unix(socket, &url, &req).await,
                None => self.send_tcp(&url, &req).await,
            }
        };

        let body = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    url = %url,
                    "Request took longer than {} seconds",
                    self.timeout.as_secs_f64()
                );
                return Err(ClientError::Timeout(self.timeout));
            }
        };

        serde_json::from_slice(&body).map_err(ClientError::Decode)
    }

    async fn send_tcp(&self, url: &Url, req: &JsonRequest) -> Result<Bytes, ClientError> {
        let mut builder = self.inner.request(req.method.clone(), url.clone());
        for (k, v) in &req.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }

        let resp = builder.send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            debug!(status = %status, url = %url, "non-success status");
        }
        resp.bytes().await.map_err(transport)
    }

    async fn send_unix(
        &self,
        socket: &AbsolutePath,
        url: &Url,
        req: &JsonRequest,
    ) -> Result<Bytes, ClientError> {
        let stream = UnixStream::connect(socket).await.map_err(transport)?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(transport)?;

        // Dropped together with this future, so a timed-out exchange also tears down the connection.
        let _conn = AbortOnDropHandle::new(tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("unix connection closed with error: {}", e);
            }
        }));

        let target = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };

        let mut builder = hyper::Request::builder()
            .method(req.method.clone())
            .uri(target)
            .header(hyper::header::HOST, url.host_str().unwrap_or("localhost"));
        for (k, v) in &req.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        let body = Full::new(Bytes::from(req.body.clone().unwrap_or_default()));
        let request = builder.body(body).map_err(transport)?;

        let resp = sender.send_request(request).await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            debug!(status = %status, url = %url, "non-success status");
        }
        let collected = resp.into_body().collect().await.map_err(transport)?;
        Ok(collected.to_bytes())
    }
}

fn transport<E: std::fmt::Display>(e: E) -> ClientError {
    ClientError::Transport(e.to_string())
}
