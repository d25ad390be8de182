//! Error types for executor construction and request execution.
//!
//! # Design
//! Construction problems (`ConfigError`) are fatal and surface before any
//! network activity. Per-call problems are reported as `ExecuteError`, which
//! wraps the engine's `TransferError` together with the method, target and
//! proxy of the failed exchange. Callers that only care about "did the
//! network work" can use `is_connection()`, which also covers timeouts.

use std::io;

use thiserror::Error;

use crate::http::HttpMethod;

/// Invalid or unreadable executor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    EmptyUrl { field: &'static str },

    #[error("{field} is not a valid URL ({url:?}): {source}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{field} uses unsupported scheme {scheme:?}")]
    UnsupportedScheme { field: &'static str, scheme: String },

    #[error("{field} has no host ({url:?})")]
    MissingHost { field: &'static str, url: String },

    #[error("{field} must be greater than zero")]
    InvalidTimeout { field: &'static str },

    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure reported by a `TransferEngine`.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The proxy could not be reached, refused the connection, or dropped it.
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out: {0}")]
    Timeout(String),

    /// Unparseable status line, headers or body framing.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The request could not be put on the wire (bad header name, bad URI).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The blocking task running the transfer did not produce a result.
    #[error("transfer task failed: {0}")]
    Runtime(String),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Connect(_) => ErrorKind::Connection,
            TransferError::Io(e) if e.kind() == io::ErrorKind::TimedOut => ErrorKind::Timeout,
            TransferError::Io(_) => ErrorKind::Connection,
            TransferError::Timeout(_) => ErrorKind::Timeout,
            TransferError::Protocol(_) => ErrorKind::Protocol,
            TransferError::InvalidRequest(_) => ErrorKind::Request,
            TransferError::Runtime(_) => ErrorKind::Runtime,
        }
    }
}

/// Broad class of a per-call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Protocol,
    Timeout,
    Request,
    Runtime,
}

/// A failed `execute_once*` call. No response was produced.
#[derive(Debug, Error)]
#[error("{method} {target} via {proxy}: {source}")]
pub struct ExecuteError {
    kind: ErrorKind,
    method: HttpMethod,
    target: String,
    proxy: String,
    source: TransferError,
}

impl ExecuteError {
    pub fn new(method: HttpMethod, target: impl Into<String>, proxy: impl Into<String>, source: TransferError) -> Self {
        Self {
            kind: source.kind(),
            method,
            target: target.into(),
            proxy: proxy.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn proxy(&self) -> &str {
        &self.proxy
    }

    pub fn transfer_error(&self) -> &TransferError {
        &self.source
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    /// True for connection failures and timeouts.
    pub fn is_connection(&self) -> bool {
        matches!(self.kind, ErrorKind::Connection | ErrorKind::Timeout)
    }
}
