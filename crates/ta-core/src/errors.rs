use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::rate_limit::RateLimitSnapshot;
use crate::recovery::{Failure, Recoverable};
use crate::transport::HttpResponse;

/// Coarse classification of a transport-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportErrorKind {
    Timeout,
    HostUnreachable,
    ConnectionLost,
    DnsFailure,
    ConnectionRefused,
    Tls,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::HostUnreachable => "host unreachable",
            Self::ConnectionLost => "connection lost",
            Self::DnsFailure => "DNS failure",
            Self::ConnectionRefused => "connection refused",
            Self::Tls => "TLS failure",
            Self::Other => "transport failure",
        };
        f.write_str(name)
    }
}

/// A failed network exchange that never produced an HTTP response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let mut chain = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        let lowered = chain.to_ascii_lowercase();

        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            if lowered.contains("dns") || lowered.contains("resolve") {
                TransportErrorKind::DnsFailure
            } else if lowered.contains("refused") {
                TransportErrorKind::ConnectionRefused
            } else if lowered.contains("certificate") || lowered.contains("tls") {
                TransportErrorKind::Tls
            } else {
                TransportErrorKind::HostUnreachable
            }
        } else if err.is_request() || err.is_body() || err.is_decode() {
            TransportErrorKind::ConnectionLost
        } else {
            TransportErrorKind::Other
        };

        Self::new(kind, chain)
    }
}

/// Invalid recovery policy values, raised only when a policy is built
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("retry count must not be negative (got {0})")]
    NegativeRetryCount(i64),

    #[error("base retry delay must be greater than zero")]
    NonPositiveBaseDelay,

    #[error("max retry delay {max:?} is shorter than base retry delay {base:?}")]
    MaxBelowBase { base: Duration, max: Duration },
}

/// Failure of a request sent through [`crate::NetworkRecoveryHandler::send`]
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Network error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP error {}: {}", .0.status, .0.body_snippet())]
    Status(Box<HttpResponse>),

    #[error("Rate limited on {}", .snapshot.as_ref().map(|s| s.path.as_str()).unwrap_or("request"))]
    RateLimited {
        snapshot: Option<RateLimitSnapshot>,
        retry_after: Option<Duration>,
        response: Box<HttpResponse>,
    },
}

impl RequestError {
    /// HTTP status of the failed response, if one was received
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport(_) => None,
            Self::Status(response) => Some(response.status),
            Self::RateLimited { response, .. } => Some(response.status),
        }
    }
}

impl Recoverable for RequestError {
    fn failure(&self) -> Failure<'_> {
        match self {
            Self::Transport(err) => Failure::Transport(err.kind),
            Self::Status(response) => Failure::Status(response),
            Self::RateLimited { .. } => Failure::Fatal,
        }
    }

    fn rate_limited(self, snapshot: Option<RateLimitSnapshot>, retry_after: Option<Duration>) -> Self {
        match self {
            Self::Status(response) => Self::RateLimited {
                snapshot,
                retry_after,
                response,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, RequestError>;
