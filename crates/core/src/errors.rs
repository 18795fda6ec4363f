//! Error types for the mergeflow core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Stream errors
// ---------------------------------------------------------------------------

/// Errors from the incremental text-stream consumer.
///
/// Kept `Clone` so the last failure can be stored in
/// [`StreamState`](crate::stream::StreamState) and handed out in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The endpoint answered with a non-success status code.
    #[error("HTTP error! status: {status}")]
    Http { status: u16 },

    /// The response body could not be read at all.
    #[error("no response body reader available")]
    Unavailable,

    /// The connection failed while the request was sent or the body was
    /// being read.
    #[error("stream transport error: {0}")]
    Transport(String),

    /// No segment arrived within the configured read timeout.
    #[error("stream stalled: no data received for {after:?}")]
    Timeout { after: Duration },

    /// A newer `start_stream` or a `reset` invalidated this stream.
    #[error("stream superseded by a newer request")]
    Superseded,
}

impl StreamError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status } => Some(*status),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// API errors
// ---------------------------------------------------------------------------

/// Errors from the service REST API wrappers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP-level transport error (network, TLS, decoding).
    #[error("API HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured base URL or a derived URL is not usable.
    #[error("invalid API URL '{url}': {detail}")]
    InvalidUrl { url: String, detail: String },

    /// The session token cannot be sent as a cookie header.
    #[error("session token contains characters not allowed in a cookie")]
    InvalidSession,

    /// The response body was not the JSON we expected.
    #[error("API response parse error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The API returned a non-success status code.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    /// Committing the resolved file failed.
    #[error("commit failed (HTTP {status}): {message}")]
    Commit { status: u16, message: String },

    /// Staging the resolved file through merge accept failed.
    #[error("merge accept failed (HTTP {status}): {message}")]
    MergeAccept { status: u16, message: String },

    /// Declining the merge failed.
    #[error("merge decline failed (HTTP {status}): {message}")]
    MergeDecline { status: u16, message: String },

    /// Cloning a repository onto the server failed.
    #[error("clone failed (HTTP {status}): {message}")]
    CloneRepo { status: u16, message: String },

    /// The server answered with `success: false` in its response envelope.
    #[error("request rejected by server: {message}")]
    Rejected { message: String },

    /// A repository name that the server would refuse.
    #[error("invalid repository name '{0}': use letters, digits, '.', '_' or '-'")]
    InvalidRepoName(String),

    /// An owner name that the server would refuse.
    #[error("invalid owner '{0}': use letters, digits, '.', '_' or '-'")]
    InvalidOwner(String),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from conflict-marker parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    /// A marker block is unterminated or out of order.
    #[error("malformed conflict markers at line {line}: {detail}")]
    MalformedMarkers { line: usize, detail: String },
}

// ---------------------------------------------------------------------------
// Resolution errors
// ---------------------------------------------------------------------------

/// Errors from driving a single conflict resolution.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// An action was attempted in the wrong lifecycle phase.
    #[error("cannot {action} while resolution is {actual}")]
    InvalidPhase {
        action: &'static str,
        actual: String,
    },

    /// The commit of the accepted resolution failed.
    #[error("resolution commit error: {0}")]
    Api(#[from] ApiError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
