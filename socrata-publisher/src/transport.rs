//! Transport layer for talking to the publisher API.
//!
//! The core only ever sees the [`Transport`] trait: a request goes in, a status
//! code and body string come out. Authentication and headers belong to the
//! implementation.
//! - [`HttpTransport`]: reqwest-backed transport with basic auth and app token
//! - [`ScriptedTransport`]: replays queued responses and records requests (for testing)

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{Result, SocrataError};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// Ordered single-valued parameters, used both as a query string and as form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value for that key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
        self
    }

    /// Builder-style variant of [`Params::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Body of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    /// A raw (JSON) string body.
    Text(String),
    /// URL-encoded form fields.
    Form(Params),
    /// A multipart upload of a file from disk.
    File(PathBuf),
}

/// A single request against the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub params: Params,
    pub body: Body,
}

impl Request {
    fn new(method: Method, url: impl Into<String>, params: Params, body: Body) -> Self {
        Self {
            method,
            url: url.into(),
            params,
            body,
        }
    }

    pub fn get(url: impl Into<String>, params: Params) -> Self {
        Self::new(Method::Get, url, params, Body::Empty)
    }

    pub fn post_form(url: impl Into<String>, form: Params) -> Self {
        Self::new(Method::Post, url, Params::new(), Body::Form(form))
    }

    pub fn post_text(url: impl Into<String>, params: Params, body: impl Into<String>) -> Self {
        Self::new(Method::Post, url, params, Body::Text(body.into()))
    }

    pub fn post_file(url: impl Into<String>, params: Params, file: impl AsRef<Path>) -> Self {
        Self::new(
            Method::Post,
            url,
            params,
            Body::File(file.as_ref().to_path_buf()),
        )
    }

    pub fn put_text(url: impl Into<String>, params: Params, body: impl Into<String>) -> Self {
        Self::new(Method::Put, url, params, Body::Text(body.into()))
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url, Params::new(), Body::Empty)
    }
}

/// Status code and body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Executes requests against the publisher API.
///
/// Implementations only fail for I/O-level problems (connection refused,
/// unreadable upload). Every HTTP status, including errors, is returned as a
/// [`Response`] so the caller can classify it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &Request) -> Result<Response>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// reqwest-backed transport.
///
/// Every request carries `Accept: application/json`, the `X-Socrata-Host`
/// domain header, basic auth credentials and the `X-App-Token` header.
pub struct HttpTransport {
    client: reqwest::Client,
    domain: String,
    username: Option<String>,
    password: Option<String>,
    app_token: Option<String>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .finish()
    }
}

impl HttpTransport {
    /// Build a transport from connection settings. The password is read from
    /// the environment variable named by `password_env`.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SocrataError::Transport {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            domain: config.domain.clone(),
            username: config.username.clone(),
            password: config.password(),
            app_token: config.app_token.clone(),
        })
    }

    fn builder(&self, request: &Request) -> reqwest::RequestBuilder {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };

        let mut builder = builder
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Socrata-Host", &self.domain);
        if !request.params.is_empty() {
            builder = builder.query(request.params.pairs());
        }
        if let Some(ref username) = self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }
        if let Some(ref token) = self.app_token {
            builder = builder.header("X-App-Token", token);
        }
        builder
    }

    async fn multipart(path: &Path) -> Result<reqwest::multipart::Form> {
        let file_name = file_name(path)?;
        let bytes = tokio::fs::read(path).await?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.clone());
        Ok(reqwest::multipart::Form::new().part(file_name, part))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &Request) -> Result<Response> {
        let builder = self.builder(request);
        let builder = match &request.body {
            Body::Empty => builder,
            Body::Text(text) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(text.clone()),
            Body::Form(form) => builder.form(form.pairs()),
            Body::File(path) => builder.multipart(Self::multipart(path).await?),
        };

        debug!(method = %request.method, url = %request.url, "Sending request");

        let response = builder.send().await.map_err(|e| SocrataError::Transport {
            message: format!("{} {} failed: {}", request.method, request.url, e),
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| SocrataError::Transport {
            message: format!("Failed to read response body: {}", e),
        })?;

        debug!(status, bytes = body.len(), "Received response");
        Ok(Response { status, body })
    }
}

/// The final path component of an upload, as sent to the server.
pub(crate) fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            SocrataError::precondition(format!("{} has no usable file name", path.display()))
        })
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

/// In-process transport that replays queued responses in order.
///
/// Every executed request is recorded so tests can assert on what was sent.
/// Running out of queued responses is a transport error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Response>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to be returned by the next `execute` call.
    pub fn push(&self, status: u16, body: impl Into<String>) -> &Self {
        self.lock_responses().push_back(Response::new(status, body));
        self
    }

    /// Every request executed so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of queued responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock_responses().len()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Response>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &Request) -> Result<Response> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        self.lock_responses()
            .pop_front()
            .ok_or_else(|| SocrataError::Transport {
                message: format!(
                    "no scripted response left for {} {}",
                    request.method, request.url
                ),
            })
    }
}
