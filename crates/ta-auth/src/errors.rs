use std::time::Duration;

use reqwest::StatusCode;
use ta_core::{Failure, HttpResponse, RateLimitSnapshot, Recoverable, TransportError};
use thiserror::Error;

use crate::credential::Credential;
use crate::models::TokenErrorResponse;

/// Authentication error types
///
/// Cloneable so a single refresh outcome can be handed to every waiter.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("User cancelled the authorization flow")]
    UserCancelled,

    #[error("Invalid redirect URI or missing code")]
    InvalidRedirect,

    #[error("OAuth state mismatch - possible CSRF attack")]
    StateMismatch,

    #[error("Missing refresh token - cannot refresh credential")]
    MissingRefreshToken,

    #[error("No credential is cached")]
    NotAuthenticated,

    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    #[error("Token endpoint returned {}: {}", .0.status, .0.body_snippet())]
    Http(Box<HttpResponse>),

    #[error("Network error: {0}")]
    Transport(#[from] TransportError),

    #[error("Token endpoint rate limited the request")]
    RateLimited {
        snapshot: Option<RateLimitSnapshot>,
        retry_after: Option<Duration>,
    },

    #[error("Authenticated, but the credential could not be saved: {message}")]
    Persistence {
        credential: Box<Credential>,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Refresh task did not complete: {0}")]
    Interrupted(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AuthError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Status and body of a non-2xx token endpoint response
    pub fn http_failure(&self) -> Option<(StatusCode, String)> {
        match self {
            Self::Http(response) => Some((response.status, response.text())),
            _ => None,
        }
    }

    /// Parsed OAuth error body of a non-2xx token endpoint response
    pub fn oauth_error(&self) -> Option<TokenErrorResponse> {
        match self {
            Self::Http(response) => TokenErrorResponse::from_slice(&response.body),
            _ => None,
        }
    }

    /// True when a valid credential exists despite the failure, i.e. only
    /// saving it went wrong
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// The in-memory credential of a persistence failure
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            Self::Persistence { credential, .. } => Some(credential),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

impl Recoverable for AuthError {
    fn failure(&self) -> Failure<'_> {
        match self {
            Self::Transport(err) => Failure::Transport(err.kind),
            Self::Http(response) => Failure::Status(response),
            _ => Failure::Fatal,
        }
    }

    fn rate_limited(self, snapshot: Option<RateLimitSnapshot>, retry_after: Option<Duration>) -> Self {
        match self {
            Self::Http(_) => Self::RateLimited {
                snapshot,
                retry_after,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
