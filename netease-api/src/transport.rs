//! HTTP plumbing: the raw transport seam and the WEAPI signing layer on top.
//!
//! [`HttpTransport`] is the only place that touches the network. The default
//! implementation is [`ReqwestTransport`]; tests swap in stubs.
//! [`SignedTransport`] turns a [`RequestEnvelope`] into a WEAPI POST:
//!
//! 1. Encrypt the envelope with [`CryptoEngine`] (fresh key every call)
//! 2. POST `params` + `encSecKey` to `{base}/weapi{path}`
//! 3. Attach the session cookie, if any, as a plain `Cookie` header
//! 4. Decode the body and map `code` to a typed error

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::header::{CONTENT_TYPE, COOKIE, REFERER};
use serde_json::Value;
use tracing::debug;

use crate::auth::Session;
use crate::crypto::{CryptoEngine, RequestEnvelope};
use crate::error::{NeteaseError, Result};

/// A stream of response body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Raw HTTP operations needed by the client.
///
/// Implementations must report non-2xx statuses as
/// [`NeteaseError::Status`] so retry classification works.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST a URL-encoded form and return the whole response body.
    async fn post_form(&self, url: &str, body: String, cookie: Option<&str>) -> Result<Bytes>;

    /// GET `url` and return its body as a stream.
    async fn get_stream(&self, url: &str) -> Result<ByteStream>;
}

/// [`HttpTransport`] backed by [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// `timeout` bounds whole API calls. Media streams have no total
    /// deadline, but every read (API or media) must make progress within
    /// `timeout`, so a stalled body fails with a retryable timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .read_timeout(timeout)
            .build()?;
        Ok(Self { http, timeout })
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(NeteaseError::Status {
            status,
            url: resp.url().to_string(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(&self, url: &str, body: String, cookie: Option<&str>) -> Result<Bytes> {
        let mut req = self
            .http
            .post(url)
            .timeout(self.timeout)
            .header(REFERER, "https://music.163.com")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");

        if let Some(cookie) = cookie {
            req = req.header(COOKIE, cookie);
        }

        let resp = check_status(req.body(body).send().await?)?;
        Ok(resp.bytes().await?)
    }

    async fn get_stream(&self, url: &str) -> Result<ByteStream> {
        let resp = self
            .http
            .get(url)
            .header(REFERER, "https://music.163.com/")
            .send()
            .await?;
        let resp = check_status(resp)?;
        Ok(Box::pin(resp.bytes_stream().map_err(NeteaseError::from)))
    }
}

/// WEAPI signing layer over an [`HttpTransport`].
#[derive(Clone)]
pub struct SignedTransport {
    http: Arc<dyn HttpTransport>,
    crypto: CryptoEngine,
    base_url: String,
}

impl std::fmt::Debug for SignedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTransport")
            .field("base_url", &self.base_url)
            .field("crypto", &self.crypto)
            .finish_non_exhaustive()
    }
}

impl SignedTransport {
    pub fn new(http: Arc<dyn HttpTransport>, crypto: CryptoEngine, base_url: impl Into<String>) -> Self {
        Self {
            http,
            crypto,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// The underlying unsigned transport (used for media streams).
    pub fn http(&self) -> &Arc<dyn HttpTransport> {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a signed request and return the decoded JSON body.
    ///
    /// The session only contributes the `Cookie` header; it never enters the
    /// encrypted envelope. Each call, retries included, encrypts with new
    /// key material.
    ///
    /// # Errors
    ///
    /// - [`NeteaseError::Http`] / [`NeteaseError::Status`]: transport layer
    /// - [`NeteaseError::MalformedResponse`]: body is neither JSON nor a sealed payload
    /// - [`NeteaseError::NotLoggedIn`]: `code` 301
    /// - [`NeteaseError::Api`]: any other non-200 `code`
    pub async fn call(&self, envelope: &RequestEnvelope, session: Option<&Session>) -> Result<Value> {
        let payload = self.crypto.encrypt(envelope)?;
        let url = format!("{}/weapi{}", self.base_url, envelope.path());
        let cookie = session.and_then(Session::cookie_header);

        debug!(
            endpoint = envelope.path(),
            authenticated = cookie.is_some(),
            "sending signed request"
        );
        let body = self
            .http
            .post_form(&url, payload.form_body(), cookie.as_deref())
            .await?;

        check_code(self.decode(&body)?)
    }

    fn decode(&self, body: &[u8]) -> Result<Value> {
        let trimmed = body.trim_ascii();
        let plain;
        let json = if trimmed.first() == Some(&b'{') {
            trimmed
        } else {
            plain = self.crypto.decrypt(trimmed)?;
            plain.as_slice()
        };
        serde_json::from_slice(json).map_err(|e| NeteaseError::MalformedResponse(e.to_string()))
    }
}

fn check_code(json: Value) -> Result<Value> {
    match json.get("code").and_then(Value::as_i64) {
        None | Some(200) => Ok(json),
        Some(301) => Err(NeteaseError::NotLoggedIn),
        Some(code) => {
            let message = json
                .get("message")
                .or_else(|| json.get("msg"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_owned();
            Err(NeteaseError::Api { code, message })
        }
    }
}
