//! HTTP client for Netease Cloud Music WEAPI.
//!
//! All requests go through [`SignedTransport`]:
//!
//! 1. Serialize parameters as canonical JSON
//! 2. Double AES-128-CBC encrypt → `params` (base64)
//! 3. RSA encrypt the random AES key → `encSecKey` (hex)
//! 4. POST to `https://music.163.com/weapi{endpoint}` with URL-encoded body
//!
//! The server responds with JSON containing a `code` field (200 = success).
//!
//! # Response format
//!
//! All API responses share this envelope:
//!
//! ```json
//! {
//!   "code": 200,
//!   ...endpoint-specific fields...
//! }
//! ```
//!
//! Non-200 codes are mapped to [`NeteaseError::Api`](crate::NeteaseError::Api),
//! except 301 which becomes [`NeteaseError::NotLoggedIn`](crate::NeteaseError::NotLoggedIn).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::auth::Session;
use crate::crypto::{CryptoEngine, KeySource, OsKeySource, RequestEnvelope};
use crate::error::{NeteaseError, Result};
use crate::transport::{ByteStream, HttpTransport, ReqwestTransport, SignedTransport};

pub const BASE_URL: &str = "https://music.163.com";
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Async client for the Netease Cloud Music API.
///
/// Holds a [`SignedTransport`] and a read-only [`Session`]. API methods are
/// implemented in separate modules (`search`, `track`, `playlist`, `album`,
/// `user`, `discover`) as `impl NeteaseClient` blocks. Cloning is cheap and
/// clones share the session.
#[derive(Debug, Clone)]
pub struct NeteaseClient {
    transport: SignedTransport,
    session: Arc<Session>,
}

impl NeteaseClient {
    /// Create a new client, loading the session from
    /// `~/.config/ncm/session.json`.
    pub fn new() -> Result<Self> {
        Self::builder().session(Session::load()?).build()
    }

    /// Create a client with an explicit [`Session`].
    pub fn with_session(session: Session) -> Result<Self> {
        Self::builder().session(session).build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Return a reference to the current session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &SignedTransport {
        &self.transport
    }

    /// Send a WEAPI-encrypted POST request.
    ///
    /// Returns the full JSON response on success (code 200).
    pub async fn request(&self, envelope: &RequestEnvelope) -> Result<Value> {
        self.transport.call(envelope, Some(&self.session)).await
    }

    /// Fail fast with [`NeteaseError::NotLoggedIn`] if no cookie is configured.
    pub(crate) fn require_login(&self) -> Result<()> {
        if self.session.is_logged_in() {
            Ok(())
        } else {
            Err(NeteaseError::NotLoggedIn)
        }
    }

    /// Open a media URL (CDN link from `track_url`/`download_url`) as a byte stream.
    pub async fn open_stream(&self, url: &str) -> Result<ByteStream> {
        self.transport.http().get_stream(url).await
    }
}

/// Builder for [`NeteaseClient`].
///
/// ```no_run
/// use std::time::Duration;
/// use netease_api::{NeteaseClient, auth::Session};
///
/// let client = NeteaseClient::builder()
///     .session(Session::new("YOUR_MUSIC_U"))
///     .timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// ```
#[must_use]
pub struct ClientBuilder {
    base_url: String,
    user_agent: String,
    timeout: Duration,
    session: Session,
    transport: Option<Arc<dyn HttpTransport>>,
    key_source: Option<Arc<dyn KeySource>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_owned(),
            user_agent: USER_AGENT.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            session: Session::default(),
            transport: None,
            key_source: None,
        }
    }
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

    /// Timeout for API calls (default 30s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    /// Replace the reqwest transport (user agent and timeout are then ignored).
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the OS key source.
    pub fn key_source(mut self, key_source: Arc<dyn KeySource>) -> Self {
        self.key_source = Some(key_source);
        self
    }

    pub fn build(self) -> Result<NeteaseClient> {
        let http = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(&self.user_agent, self.timeout)?),
        };
        let keys = self.key_source.unwrap_or_else(|| Arc::new(OsKeySource));
        Ok(NeteaseClient {
            transport: SignedTransport::new(http, CryptoEngine::with_key_source(keys), self.base_url),
            session: Arc::new(self.session),
        })
    }
}
