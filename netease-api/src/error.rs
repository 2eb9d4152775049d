//! Error types for the Netease Cloud Music API client.

use crate::quality::QualityLevel;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when interacting with the Netease API or when
/// downloading media from it.
#[derive(Debug, Error)]
pub enum NeteaseError {
    /// HTTP transport error (connection refused, timeout, TLS failure, etc.).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx HTTP status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// HTTP status returned by the server.
        status: StatusCode,
        /// Requested URL.
        url: String,
    },

    /// The API returned a non-200 `code` in its JSON response body.
    ///
    /// Common codes:
    /// - `403` : access denied (VIP required or region-locked)
    /// - `-460`: cheating detected (request too frequent)
    ///
    /// Code `301` is reported as [`NeteaseError::NotLoggedIn`] instead.
    #[error("API error (code {code}): {message}")]
    Api {
        /// Netease API status code (not HTTP status).
        code: i64,
        /// Human-readable error message from the API.
        message: String,
    },

    /// The response body could not be decrypted or decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The endpoint requires a valid `MUSIC_U` session. Call `login` first.
    #[error("not logged in")]
    NotLoggedIn,

    /// The track does not exist (or the detail endpoint returned nothing).
    #[error("track not found: {0}")]
    TrackNotFound(u64),

    /// No level of the fallback chain produced a playable URL.
    #[error("track {track_id}: no quality level available (requested {requested})")]
    QualityUnavailable {
        /// Track that could not be resolved.
        track_id: u64,
        /// Level originally requested by the caller.
        requested: QualityLevel,
    },

    /// Downloaded bytes did not match what the server announced.
    #[error("integrity check failed: {0}")]
    IntegrityMismatch(String),

    /// Random key generation or a cipher operation failed.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// A filename template could not be parsed.
    #[error("invalid name template: {0}")]
    Template(String),

    /// The operation was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,

    /// File I/O error (session read/write, download write, rename).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON response from the API.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors (e.g. missing config directory).
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a [`NeteaseError`], used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network or HTTP layer.
    Transport,
    /// Undecodable body, service error code, or integrity failure.
    Protocol,
    /// A valid session is required.
    AuthRequired,
    /// Fallback chain exhausted.
    QualityUnavailable,
    /// Local write/rename failure.
    Filesystem,
    /// Entropy or cipher failure.
    Crypto,
    /// Caller-initiated cancellation.
    Cancelled,
}

impl NeteaseError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) | Self::Status { .. } => ErrorCategory::Transport,
            Self::Api { .. }
            | Self::MalformedResponse(_)
            | Self::TrackNotFound(_)
            | Self::IntegrityMismatch(_)
            | Self::Json(_)
            | Self::Template(_)
            | Self::Other(_) => ErrorCategory::Protocol,
            Self::NotLoggedIn => ErrorCategory::AuthRequired,
            Self::QualityUnavailable { .. } => ErrorCategory::QualityUnavailable,
            Self::Io(_) => ErrorCategory::Filesystem,
            Self::Crypto(_) => ErrorCategory::Crypto,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Only network hiccups, server-side 5xx/429 and corrupted transfers
    /// qualify. Service error codes need user action and are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::IntegrityMismatch(_) => true,
            _ => false,
        }
    }
}

/// Convenience alias for `Result<T, NeteaseError>`.
pub type Result<T> = std::result::Result<T, NeteaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = NeteaseError::Status {
            status: StatusCode::BAD_GATEWAY,
            url: "https://music.163.com/weapi/song/lyric".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.category(), ErrorCategory::Transport);

        let throttled = NeteaseError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            url: String::new(),
        };
        assert!(throttled.is_transient());
    }

    #[test]
    fn client_errors_and_api_codes_are_permanent() {
        let not_found = NeteaseError::Status {
            status: StatusCode::NOT_FOUND,
            url: String::new(),
        };
        assert!(!not_found.is_transient());

        let api = NeteaseError::Api { code: -460, message: "cheating".into() };
        assert!(!api.is_transient());
        assert_eq!(api.category(), ErrorCategory::Protocol);

        assert!(!NeteaseError::NotLoggedIn.is_transient());
        assert_eq!(NeteaseError::NotLoggedIn.category(), ErrorCategory::AuthRequired);
    }

    #[test]
    fn quality_and_filesystem_categories() {
        let q = NeteaseError::QualityUnavailable {
            track_id: 1,
            requested: QualityLevel::Hires,
        };
        assert_eq!(q.category(), ErrorCategory::QualityUnavailable);
        assert!(!q.is_transient());

        let io = NeteaseError::Io(std::io::Error::other("disk full"));
        assert_eq!(io.category(), ErrorCategory::Filesystem);
        assert!(!io.is_transient());
    }
}
