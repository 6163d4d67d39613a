use std::path::PathBuf;

use ta_auth::AuthError;
use ta_core::{PolicyError, RequestError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Failed to build HTTP client: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid recovery settings: {0}")]
    Policy(#[from] PolicyError),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParsingFailed(#[from] toml::de::Error),

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Credential cannot be sent as a header value: {0}")]
    InvalidCredentialHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status of a failed resource request, if one was received
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Request(err) => err.status(),
            Self::Auth(err) => err.http_failure().map(|(status, _)| status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
