use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ta_auth::config::endpoints;
use ta_auth::{AuthConfig, JsonFileCredentialStore};
use ta_core::recovery::{
    DEFAULT_BASE_RETRY_DELAY, DEFAULT_MAX_NETWORK_RETRIES, DEFAULT_MAX_RATE_LIMIT_RETRIES,
    DEFAULT_MAX_RETRY_DELAY,
};
use ta_core::{HttpTimeouts, RecoveryPolicy};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1/";

/// Client settings as read from a TOML file
///
/// Every field except `client_id` and `redirect_uri` may be omitted.
/// Durations are given in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub show_dialog: bool,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Where the credential is saved; the platform config dir when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub recovery: RecoverySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let timeouts = HttpTimeouts::default();
        Self {
            connect_timeout_ms: duration_ms(timeouts.connect),
            request_timeout_ms: duration_ms(timeouts.request),
        }
    }
}

/// Retry settings. `max_network_retries` is signed so a negative value in
/// the file is reported instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub max_network_retries: i64,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub max_rate_limit_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable_status_codes: Option<Vec<u16>>,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            max_network_retries: i64::from(DEFAULT_MAX_NETWORK_RETRIES),
            base_retry_delay_ms: duration_ms(DEFAULT_BASE_RETRY_DELAY),
            max_retry_delay_ms: duration_ms(DEFAULT_MAX_RETRY_DELAY),
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
            retryable_status_codes: None,
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_authorize_url() -> String {
    endpoints::AUTHORIZE.to_string()
}

fn default_token_url() -> String {
    endpoints::TOKEN.to_string()
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|source| Error::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            show_dialog: false,
            api_base_url: default_api_base_url(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            user_agent: None,
            credentials_path: None,
            http: HttpSettings::default(),
            recovery: RecoverySettings::default(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    #[instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::ConfigReadFailed {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::from_toml_str(&content)?;
        debug!(client_id = %config.client_id, "Loaded client config");
        Ok(config)
    }

    pub fn http_timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: Duration::from_millis(self.http.connect_timeout_ms),
            request: Duration::from_millis(self.http.request_timeout_ms),
        }
    }

    /// Validated retry policy; rejects negative retry counts, a zero base
    /// delay and a max delay below the base delay
    pub fn recovery_policy(&self) -> Result<RecoveryPolicy> {
        let settings = &self.recovery;
        let mut policy = RecoveryPolicy::from_signed(
            settings.max_network_retries,
            Duration::from_millis(settings.base_retry_delay_ms),
            Duration::from_millis(settings.max_retry_delay_ms),
        )?
        .with_max_rate_limit_retries(settings.max_rate_limit_retries);

        if let Some(codes) = &settings.retryable_status_codes {
            policy = policy.with_retryable_status_codes(codes.iter().copied());
        }
        Ok(policy)
    }

    pub fn api_base_url(&self) -> Result<Url> {
        parse_url(&self.api_base_url)
    }

    pub fn auth_config(&self) -> Result<AuthConfig> {
        let mut config = AuthConfig::new(self.client_id.clone(), parse_url(&self.redirect_uri)?)
            .with_scopes(self.scopes.iter().cloned())
            .with_authorize_url(parse_url(&self.authorize_url)?)
            .with_token_url(parse_url(&self.token_url)?)
            .with_recovery(self.recovery_policy()?);

        if let Some(secret) = &self.client_secret {
            config = config.with_client_secret(secret.clone());
        }
        if self.user_agent.is_some() {
            config.user_agent = self.user_agent.clone();
        }
        config.show_dialog = self.show_dialog;
        config.http_timeouts = self.http_timeouts();
        Ok(config)
    }

    /// File store at `credentials_path`, or the platform default
    pub async fn credential_store(&self) -> Result<JsonFileCredentialStore> {
        let path = match &self.credentials_path {
            Some(path) => path.clone(),
            None => JsonFileCredentialStore::default_path()?,
        };
        Ok(JsonFileCredentialStore::new(path).await?)
    }
}
